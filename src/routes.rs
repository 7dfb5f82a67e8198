//! API Router
//! Mission: Wire middleware and handlers into the request pipeline
//!
//! Pipeline order per request: rate limiter → response cache (product reads)
//! → auth middleware (where the route needs identity) → handler. CORS, panic
//! recovery, and request logging wrap the whole router.

use crate::auth::{
    api as auth_api, auth_middleware, optional_auth_middleware, require_admin, require_editor,
    AuthState, JwtHandler, UserStore,
};
use crate::config::Config;
use crate::middleware::{
    rate_limit_middleware, request_logging, response_cache::response_cache_middleware,
    CacheStats, RateLimitConfig, RateLimiter, ResponseCache,
};
use crate::products::{api as products_api, ProductStore, ProductsState};
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Everything the router needs, built once at startup and handed to the
/// request pipeline by reference. Nothing here is a process-wide global.
#[derive(Clone)]
pub struct AppContext {
    pub auth_state: AuthState,
    pub products_state: ProductsState,
    pub cache: Arc<ResponseCache>,
    pub general_limiter: RateLimiter,
    pub auth_limiter: RateLimiter,
    pub cors_allowed_origins: Vec<String>,
}

impl AppContext {
    pub fn build(config: &Config) -> Result<Self> {
        let user_store = Arc::new(UserStore::new(&config.database_path)?);
        let product_store = Arc::new(ProductStore::new(&config.database_path)?);
        let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));

        let cache = Arc::new(ResponseCache::new(
            config.cache_ttl,
            config.cache_max_entries,
            config.cache_invalidate_on_write,
        ));

        let general_limiter = RateLimiter::new(RateLimitConfig {
            max_requests: config.rate_limit_max,
            window: config.rate_limit_window,
            message: "Too many requests. Please slow down.".to_string(),
        });
        let auth_limiter = RateLimiter::new(RateLimitConfig {
            max_requests: config.auth_rate_limit_max,
            window: config.auth_rate_limit_window,
            message: "Too many authentication attempts. Please try again later.".to_string(),
        });

        Ok(Self {
            auth_state: AuthState::new(user_store, jwt_handler, config),
            products_state: ProductsState {
                store: product_store,
                cache: cache.clone(),
            },
            cache,
            general_limiter,
            auth_limiter,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        })
    }
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    // Credential endpoints carry the stricter auth budget
    let auth_public = Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/login/otp", post(auth_api::login_otp))
        .route("/api/auth/forgot-password", post(auth_api::forgot_password))
        .route_layer(middleware::from_fn_with_state(
            ctx.auth_limiter.clone(),
            rate_limit_middleware,
        ))
        .with_state(ctx.auth_state.clone());

    // Reset consumption only counts against the general budget
    let auth_open = Router::new()
        .route("/api/auth/reset-password", post(auth_api::reset_password))
        .with_state(ctx.auth_state.clone());

    let auth_private = Router::new()
        .route("/api/auth/me", get(auth_api::me))
        .route_layer(middleware::from_fn_with_state(
            ctx.auth_state.clone(),
            auth_middleware,
        ))
        .with_state(ctx.auth_state.clone());

    // Identity resolution runs before the role gate (outermost layer first)
    let admin = Router::new()
        .route("/api/auth/users", get(auth_api::list_users))
        .route("/api/auth/users/:id/role", put(auth_api::update_role))
        .route("/api/auth/users/:id/activate", put(auth_api::activate_user))
        .route(
            "/api/auth/users/:id/deactivate",
            put(auth_api::deactivate_user),
        )
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            ctx.auth_state.clone(),
            auth_middleware,
        ))
        .with_state(ctx.auth_state.clone());

    // Identity is optional on reads and attaches inside the cache layer, so
    // a cache hit skips the account lookup entirely
    let products_read = Router::new()
        .route("/api/products", get(products_api::list_products))
        .route("/api/products/:id", get(products_api::get_product))
        .route_layer(middleware::from_fn_with_state(
            ctx.auth_state.clone(),
            optional_auth_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            ctx.cache.clone(),
            response_cache_middleware,
        ))
        .with_state(ctx.products_state.clone());

    let products_write = Router::new()
        .route("/api/products", post(products_api::create_product))
        .route(
            "/api/products/:id",
            put(products_api::update_product).delete(products_api::delete_product),
        )
        .route_layer(middleware::from_fn(require_editor))
        .route_layer(middleware::from_fn_with_state(
            ctx.auth_state.clone(),
            auth_middleware,
        ))
        .with_state(ctx.products_state.clone());

    let ops = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/clear", post(cache_clear))
        .with_state(ctx.cache.clone());

    let origins: Vec<HeaderValue> = ctx
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .merge(auth_public)
        .merge(auth_open)
        .merge(auth_private)
        .merge(admin)
        .merge(products_read)
        .merge(products_write)
        .merge(ops)
        .layer(middleware::from_fn_with_state(
            ctx.general_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(request_logging))
        .layer(cors)
        .layer(CatchPanicLayer::new())
}

// ===== Operational Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Cache counters - GET /api/cache/stats
async fn cache_stats(State(cache): State<Arc<ResponseCache>>) -> Json<CacheStats> {
    Json(cache.stats())
}

/// Drop all cached responses - POST /api/cache/clear
async fn cache_clear(State(cache): State<Arc<ResponseCache>>) -> Json<serde_json::Value> {
    cache.clear();
    Json(serde_json::json!({ "message": "Cache cleared" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

//! Storefront Backend
//! Mission: E-commerce REST API with hardened auth, rate limiting, and
//! cached catalog reads

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_backend::config::Config;
use storefront_backend::routes::{create_router, AppContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    info!("🚀 Storefront API starting");

    let config = Config::from_env();
    let ctx = AppContext::build(&config)?;

    info!("📊 Database initialized at: {}", config.database_path);
    info!(
        "🔐 Auth initialized (lockout: {} attempts / {} min)",
        config.lockout_threshold, config.lockout_window_mins
    );

    // Prune idle rate-limit windows in the background
    let general_limiter = ctx.general_limiter.clone();
    let auth_limiter = ctx.auth_limiter.clone();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(300));
        loop {
            timer.tick().await;
            general_limiter.cleanup();
            auth_limiter.cleanup();
        }
    });

    let app = create_router(ctx);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Initialize tracing with env-filterable output
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the manifest-dir .env (common when running with
    //    --manifest-path from elsewhere)
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

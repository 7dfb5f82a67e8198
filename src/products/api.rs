//! Product API Endpoints
//! Mission: Public catalog reads, editor-gated catalog writes

use crate::auth::middleware::CurrentUser;
use crate::middleware::response_cache::ResponseCache;
use crate::products::models::{
    CreateProductRequest, Product, ProductListResponse, ProductQuery, UpdateProductRequest,
};
use crate::products::store::{NewProduct, ProductStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 200;

/// Shared product state
#[derive(Clone)]
pub struct ProductsState {
    pub store: Arc<ProductStore>,
    pub cache: Arc<ResponseCache>,
}

impl ProductsState {
    /// Purge cached catalog reads after a mutation, when configured to.
    /// Off by default: readers may then see pre-mutation payloads for up to
    /// the cache TTL.
    fn purge_read_cache(&self) {
        if self.cache.invalidate_on_write() {
            let purged = self.cache.purge_prefix("/api/products");
            if purged > 0 {
                info!("🧹 Purged {} cached product responses", purged);
            }
        }
    }
}

/// List products - GET /api/products (public, cached)
pub async fn list_products(
    State(state): State<ProductsState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductListResponse>, ProductApiError> {
    let products = state.store.list(&query).map_err(internal)?;

    Ok(Json(ProductListResponse {
        count: products.len(),
        products,
    }))
}

/// Fetch one product - GET /api/products/:id (public, cached)
pub async fn get_product(
    State(state): State<ProductsState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ProductApiError> {
    let id = parse_id(&product_id)?;

    let product = state
        .store
        .find_by_id(&id)
        .map_err(internal)?
        .filter(|p| p.is_active)
        .ok_or(ProductApiError::NotFound)?;

    Ok(Json(product))
}

/// Create a product - POST /api/products (editor/admin)
pub async fn create_product(
    State(state): State<ProductsState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ProductApiError> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProductApiError::Validation("Product name is required".to_string()))?;
    validate_name(name)?;

    let price = payload
        .price
        .ok_or_else(|| ProductApiError::Validation("Price is required".to_string()))?;
    validate_price(price)?;

    let stock = payload.stock.unwrap_or(0);
    validate_stock(stock)?;

    let product = state
        .store
        .insert(NewProduct {
            name: name.to_string(),
            description: payload.description.unwrap_or_default(),
            price,
            category: payload
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "general".to_string()),
            image_url: payload.image_url,
            stock,
            created_by: Some(current.id),
        })
        .map_err(internal)?;

    state.purge_read_cache();

    Ok((StatusCode::CREATED, Json(product)))
}

/// Update a product - PUT /api/products/:id (editor/admin)
pub async fn update_product(
    State(state): State<ProductsState>,
    Path(product_id): Path<String>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ProductApiError> {
    let id = parse_id(&product_id)?;

    if let Some(name) = payload.name.as_deref() {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ProductApiError::Validation(
                "Product name cannot be empty".to_string(),
            ));
        }
        validate_name(trimmed)?;
    }
    if let Some(price) = payload.price {
        validate_price(price)?;
    }
    if let Some(stock) = payload.stock {
        validate_stock(stock)?;
    }

    let product = state
        .store
        .update(&id, &payload)
        .map_err(internal)?
        .ok_or(ProductApiError::NotFound)?;

    state.purge_read_cache();

    Ok(Json(product))
}

/// Soft-delete a product - DELETE /api/products/:id (editor/admin)
pub async fn delete_product(
    State(state): State<ProductsState>,
    Path(product_id): Path<String>,
) -> Result<Json<serde_json::Value>, ProductApiError> {
    let id = parse_id(&product_id)?;

    let deleted = state.store.soft_delete(&id).map_err(internal)?;
    if !deleted {
        return Err(ProductApiError::NotFound);
    }

    state.purge_read_cache();

    Ok(Json(json!({ "message": "Product deleted" })))
}

fn parse_id(raw: &str) -> Result<Uuid, ProductApiError> {
    Uuid::parse_str(raw).map_err(|_| ProductApiError::InvalidId)
}

fn validate_name(name: &str) -> Result<(), ProductApiError> {
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ProductApiError::Validation(format!(
            "Product name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), ProductApiError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ProductApiError::Validation(
            "Price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> Result<(), ProductApiError> {
    if stock < 0 {
        return Err(ProductApiError::Validation(
            "Stock cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn internal(e: anyhow::Error) -> ProductApiError {
    warn!("Product store error: {}", e);
    ProductApiError::Internal
}

/// Product API errors
#[derive(Debug)]
pub enum ProductApiError {
    Validation(String),
    InvalidId,
    NotFound,
    Internal,
}

impl IntoResponse for ProductApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ProductApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg)
            }
            ProductApiError::InvalidId => (
                StatusCode::BAD_REQUEST,
                "INVALID_PRODUCT_ID",
                "Invalid product ID format".to_string(),
            ),
            ProductApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "PRODUCT_NOT_FOUND",
                "Product not found".to_string(),
            ),
            ProductApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            ProductApiError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProductApiError::InvalidId.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProductApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_field_validation() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(19.99).is_ok());
        assert!(validate_price(-1.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_price(f64::INFINITY).is_err());

        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-1).is_err());

        assert!(validate_name("Keyboard").is_ok());
        assert!(validate_name(&"x".repeat(201)).is_err());
    }
}

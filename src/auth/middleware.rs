//! Authentication Middleware
//! Mission: Resolve bearer tokens to live accounts and enforce role policy

use crate::auth::api::AuthState;
use crate::auth::jwt::TokenError;
use crate::auth::models::UserRole;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Identity attached to a request after token verification and account
/// re-fetch. The token is only an identity pointer: role and active status
/// always come from the store, never from the claims.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

/// Auth middleware for routes that require identity
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(&req).ok_or(AuthError::MissingToken)?;

    let user = resolve_token(&state, &token)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Optional auth middleware - continues without identity when the token is
/// absent or does not resolve
pub async fn optional_auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&req) {
        if let Ok(user) = resolve_token(&state, &token) {
            req.extensions_mut().insert(user);
        }
    }

    next.run(req).await
}

/// Role gate: admin only. Assumes identity resolution already ran.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AuthError> {
    match req.extensions().get::<CurrentUser>() {
        None => Err(AuthError::Unauthenticated),
        Some(user) if user.role != UserRole::Admin => Err(AuthError::AdminOnly),
        Some(_) => Ok(next.run(req).await),
    }
}

/// Role gate: editor or admin. Assumes identity resolution already ran.
pub async fn require_editor(req: Request, next: Next) -> Result<Response, AuthError> {
    match req.extensions().get::<CurrentUser>() {
        None => Err(AuthError::Unauthenticated),
        Some(user) if !user.role.can_edit_products() => Err(AuthError::EditorOnly),
        Some(_) => Ok(next.run(req).await),
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

fn resolve_token(state: &AuthState, token: &str) -> Result<CurrentUser, AuthError> {
    let claims = state.jwt_handler.verify(token).map_err(|e| match e {
        TokenError::Expired => AuthError::TokenExpired,
        TokenError::Malformed => AuthError::InvalidToken,
    })?;

    let id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    // Never trust stale claims for authorization decisions
    let user = state
        .user_store
        .find_for_request(&id)
        .map_err(|_| AuthError::Internal)?
        .ok_or(AuthError::AccountNotFound)?;

    if !user.is_active {
        return Err(AuthError::AccountDeactivated);
    }

    Ok(CurrentUser {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
    })
}

/// Auth error types
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    TokenExpired,
    InvalidToken,
    AccountNotFound,
    AccountDeactivated,
    Unauthenticated,
    AdminOnly,
    EditorOnly,
    Internal,
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "NO_TOKEN",
                "Missing authorization token",
            ),
            AuthError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Token has expired, please log in again",
            ),
            AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid token")
            }
            AuthError::AccountNotFound => (
                StatusCode::UNAUTHORIZED,
                "ACCOUNT_NOT_FOUND",
                "Account no longer exists",
            ),
            AuthError::AccountDeactivated => (
                StatusCode::UNAUTHORIZED,
                "ACCOUNT_DEACTIVATED",
                "Account has been deactivated",
            ),
            AuthError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required",
            ),
            AuthError::AdminOnly => (
                StatusCode::FORBIDDEN,
                "ADMIN_ONLY",
                "Admin privileges required",
            ),
            AuthError::EditorOnly => (
                StatusCode::FORBIDDEN,
                "EDITOR_ONLY",
                "Editor or admin privileges required",
            ),
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest};

    #[test]
    fn test_auth_error_statuses() {
        assert_eq!(
            AuthError::MissingToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::TokenExpired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountDeactivated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AdminOnly.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::EditorOnly.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_bearer_token_extraction() {
        let req = HttpRequest::builder()
            .header("Authorization", "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def.ghi"));

        let no_prefix = HttpRequest::builder()
            .header("Authorization", "abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert!(bearer_token(&no_prefix).is_none());

        let missing = HttpRequest::new(Body::empty());
        assert!(bearer_token(&missing).is_none());
    }

    #[test]
    fn test_current_user_in_extensions() {
        let mut req = HttpRequest::new(Body::empty());
        assert!(req.extensions().get::<CurrentUser>().is_none());

        req.extensions_mut().insert(CurrentUser {
            id: Uuid::new_v4(),
            username: "gamer1".to_string(),
            email: "a@b.com".to_string(),
            role: UserRole::Customer,
        });

        let user = req.extensions().get::<CurrentUser>().unwrap();
        assert_eq!(user.username, "gamer1");
    }
}

//! Authentication API Endpoints
//! Mission: Provide registration, login, and account management endpoints

use crate::auth::{
    jwt::JwtHandler,
    lockout::{self, LockState},
    middleware::CurrentUser,
    models::{
        ForgotPasswordRequest, LoginRequest, LoginResponse, OtpLoginRequest, RegisterRequest,
        ResetPasswordRequest, UpdateRoleRequest, User, UserResponse, UserRole,
    },
    password::{hash_password, verify_password},
    user_store::{NewUser, UserStore},
    validation,
};
use crate::config::Config;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub demo_otp: String,
    pub lockout_threshold: u32,
    pub lockout_window: Duration,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, jwt_handler: Arc<JwtHandler>, config: &Config) -> Self {
        Self {
            user_store,
            jwt_handler,
            demo_otp: config.demo_otp.clone(),
            lockout_threshold: config.lockout_threshold,
            lockout_window: Duration::minutes(config.lockout_window_mins),
        }
    }

    fn login_response(&self, user: &User) -> Result<LoginResponse, AuthApiError> {
        let (token, expires_in) = self
            .jwt_handler
            .issue(user)
            .map_err(|_| AuthApiError::Internal)?;
        Ok(LoginResponse {
            token,
            expires_in,
            user: UserResponse::from_user(user),
        })
    }
}

/// Register endpoint - POST /api/auth/register
/// Always creates a customer account; a role in the body is ignored.
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AuthApiError> {
    let username = required_field(payload.username.as_deref(), "Username")?;
    let email_raw = required_field(payload.email.as_deref(), "Email")?;
    let password = required_field(payload.password.as_deref(), "Password")?;

    validation::validate_username(&username).map_err(AuthApiError::Validation)?;
    let email = validation::normalize_email(&email_raw);
    validation::validate_email(&email).map_err(AuthApiError::Validation)?;
    validation::validate_password(&password).map_err(AuthApiError::Validation)?;

    let phone = match payload.phone.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => {
            validation::validate_phone(p).map_err(AuthApiError::Validation)?;
            Some(p.to_string())
        }
        _ => None,
    };

    info!("📝 Registration attempt: {}", email);

    if store_lookup(state.user_store.find_by_email(&email))?.is_some() {
        return Err(AuthApiError::DuplicateEmail);
    }
    if store_lookup(state.user_store.find_by_username(&username))?.is_some() {
        return Err(AuthApiError::DuplicateUsername);
    }

    let password_hash = hash_password(password)
        .await
        .map_err(|_| AuthApiError::Internal)?;

    let user = state
        .user_store
        .create_user(NewUser {
            username,
            email,
            phone,
            password_hash,
            role: UserRole::Customer,
        })
        .map_err(|e| {
            // Lost a race against a concurrent registration for the same
            // email/username; the unique constraint is authoritative.
            warn!("Failed to create account: {}", e);
            AuthApiError::DuplicateEmail
        })?;

    info!("✅ Registered: {} ({})", user.username, user.email);

    let response = state.login_response(&user)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let email_raw = required_field(payload.email.as_deref(), "Email")?;
    let password = required_field(payload.password.as_deref(), "Password")?;

    let email = validation::normalize_email(&email_raw);
    validation::validate_email(&email).map_err(AuthApiError::Validation)?;

    info!("🔐 Login attempt: {}", email);

    let user = match store_lookup(state.user_store.find_by_email(&email))? {
        Some(user) => user,
        None => {
            warn!("❌ Login for unknown email");
            return Err(AuthApiError::InvalidCredentials {
                attempts_remaining: None,
            });
        }
    };

    if !user.is_active {
        return Err(AuthApiError::AccountDeactivated);
    }

    let now = Utc::now();
    let pre_state = lockout::evaluate(user.failed_login_attempts, user.locked_until, now);
    if let LockState::Locked { .. } = pre_state {
        // Locked accounts reject immediately, correct password or not
        return Err(AuthApiError::AccountLocked {
            minutes_remaining: pre_state.remaining_minutes(now),
        });
    }

    let valid = verify_password(password, user.password_hash.clone())
        .await
        .map_err(|_| AuthApiError::Internal)?;

    if !valid {
        warn!("❌ Failed login: {}", user.username);
        let after = state
            .user_store
            .record_failed_attempt(&user.id, state.lockout_threshold, state.lockout_window)
            .map_err(|_| AuthApiError::Internal)?;

        return Err(match after {
            LockState::Locked { .. } => AuthApiError::AccountLocked {
                minutes_remaining: after.remaining_minutes(Utc::now()),
            },
            LockState::Open { attempts } => AuthApiError::InvalidCredentials {
                attempts_remaining: Some(state.lockout_threshold.saturating_sub(attempts)),
            },
        });
    }

    state
        .user_store
        .record_successful_login(&user.id)
        .map_err(|_| AuthApiError::Internal)?;

    let user = store_lookup(state.user_store.find_by_id(&user.id))?
        .ok_or(AuthApiError::Internal)?;

    info!("✅ Login successful: {} ({})", user.username, user.role.as_str());

    Ok(Json(state.login_response(&user)?))
}

/// OTP login endpoint - POST /api/auth/login/otp
/// Accepts the fixed demo OTP and provisions a customer account on first use.
pub async fn login_otp(
    State(state): State<AuthState>,
    Json(payload): Json<OtpLoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let phone = required_field(payload.phone.as_deref(), "Phone")?;
    let otp = required_field(payload.otp.as_deref(), "OTP")?;

    validation::validate_phone(&phone).map_err(AuthApiError::Validation)?;

    if otp != state.demo_otp {
        warn!("❌ Invalid OTP for phone login");
        return Err(AuthApiError::InvalidOtp);
    }

    let user = match store_lookup(state.user_store.find_by_phone(&phone))? {
        Some(user) => user,
        None => {
            // First OTP login provisions an account. Username and email are
            // synthesized (both columns are unique and required); the password
            // is random and unusable, so only OTP login works for it.
            let suffix = Uuid::new_v4().simple().to_string();
            let username = format!("user{}", &suffix[..8]);
            let email = format!("{}@phone.local", phone.trim_start_matches('+'));
            let password_hash = hash_password(Uuid::new_v4().to_string())
                .await
                .map_err(|_| AuthApiError::Internal)?;

            info!("📱 Provisioning account for first OTP login");

            state
                .user_store
                .create_user(NewUser {
                    username,
                    email,
                    phone: Some(phone.clone()),
                    password_hash,
                    role: UserRole::Customer,
                })
                .map_err(|_| AuthApiError::Internal)?
        }
    };

    if !user.is_active {
        return Err(AuthApiError::AccountDeactivated);
    }

    state
        .user_store
        .record_successful_login(&user.id)
        .map_err(|_| AuthApiError::Internal)?;

    info!("✅ OTP login successful: {}", user.username);

    Ok(Json(state.login_response(&user)?))
}

/// Forgot password - POST /api/auth/forgot-password
/// Response is uniform whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AuthState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    let email_raw = required_field(payload.email.as_deref(), "Email")?;
    let email = validation::normalize_email(&email_raw);
    validation::validate_email(&email).map_err(AuthApiError::Validation)?;

    if let Some(user) = store_lookup(state.user_store.find_by_email(&email))? {
        let token = Uuid::new_v4().simple().to_string();
        state
            .user_store
            .set_reset_token(&user.id, &token, Utc::now() + Duration::hours(1))
            .map_err(|_| AuthApiError::Internal)?;

        // Delivery is simulated; a mail provider would take over here
        info!("📧 [simulated] Password reset email to {}: token {}", user.email, token);
    }

    Ok(Json(json!({
        "message": "If an account with that email exists, a password reset link has been sent"
    })))
}

/// Reset password - POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<AuthState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    let token = required_field(payload.token.as_deref(), "Token")?;
    let password = required_field(payload.password.as_deref(), "Password")?;
    validation::validate_password(&password).map_err(AuthApiError::Validation)?;

    let password_hash = hash_password(password)
        .await
        .map_err(|_| AuthApiError::Internal)?;

    let consumed = state
        .user_store
        .consume_reset_token(&token, &password_hash)
        .map_err(|_| AuthApiError::Internal)?;

    if !consumed {
        return Err(AuthApiError::InvalidResetToken);
    }

    Ok(Json(json!({ "message": "Password has been reset" })))
}

/// Current account info - GET /api/auth/me
pub async fn me(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let user = store_lookup(state.user_store.find_for_request(&current.id))?
        .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// List all accounts - GET /api/auth/users (admin)
pub async fn list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthApiError> {
    let users = state
        .user_store
        .list_users()
        .map_err(|_| AuthApiError::Internal)?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Change an account's role - PUT /api/auth/users/:id/role (admin)
pub async fn update_role(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let id = Uuid::parse_str(&user_id).map_err(|_| AuthApiError::InvalidUserId)?;
    let role_str = required_field(payload.role.as_deref(), "Role")?;
    let role = UserRole::from_str(&role_str).ok_or(AuthApiError::InvalidRole)?;

    if id == current.id {
        return Err(AuthApiError::OwnAccount("Cannot change your own role"));
    }

    let user = state
        .user_store
        .set_role(&id, role)
        .map_err(|_| AuthApiError::Internal)?
        .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Reactivate an account - PUT /api/auth/users/:id/activate (admin)
pub async fn activate_user(
    State(state): State<AuthState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AuthApiError> {
    set_active(&state, &user_id, true)
}

/// Deactivate an account - PUT /api/auth/users/:id/deactivate (admin)
pub async fn deactivate_user(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AuthApiError> {
    if Uuid::parse_str(&user_id).ok() == Some(current.id) {
        return Err(AuthApiError::OwnAccount("Cannot deactivate your own account"));
    }
    set_active(&state, &user_id, false)
}

fn set_active(
    state: &AuthState,
    user_id: &str,
    active: bool,
) -> Result<Json<UserResponse>, AuthApiError> {
    let id = Uuid::parse_str(user_id).map_err(|_| AuthApiError::InvalidUserId)?;

    let user = state
        .user_store
        .set_active(&id, active)
        .map_err(|_| AuthApiError::Internal)?
        .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

fn required_field(value: Option<&str>, name: &str) -> Result<String, AuthApiError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthApiError::Validation(format!("{name} is required")))
}

fn store_lookup<T>(result: anyhow::Result<T>) -> Result<T, AuthApiError> {
    result.map_err(|e| {
        warn!("Store error: {}", e);
        AuthApiError::Internal
    })
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    Validation(String),
    DuplicateEmail,
    DuplicateUsername,
    InvalidCredentials { attempts_remaining: Option<u32> },
    AccountLocked { minutes_remaining: i64 },
    AccountDeactivated,
    InvalidOtp,
    InvalidResetToken,
    InvalidRole,
    InvalidUserId,
    OwnAccount(&'static str),
    UserNotFound,
    Internal,
}

impl AuthApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AuthApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AuthApiError::DuplicateEmail => (
                StatusCode::BAD_REQUEST,
                "DUPLICATE_EMAIL",
                "An account with this email already exists".to_string(),
            ),
            AuthApiError::DuplicateUsername => (
                StatusCode::BAD_REQUEST,
                "DUPLICATE_USERNAME",
                "This username is already taken".to_string(),
            ),
            // Uniform wording regardless of which credential was wrong
            AuthApiError::InvalidCredentials { attempts_remaining } => {
                let message = match attempts_remaining {
                    Some(n) => format!(
                        "Incorrect email or password. {} attempt(s) remaining before lockout",
                        n
                    ),
                    None => "Incorrect email or password".to_string(),
                };
                (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", message)
            }
            AuthApiError::AccountLocked { minutes_remaining } => (
                StatusCode::LOCKED,
                "ACCOUNT_LOCKED",
                format!(
                    "Account locked due to too many failed login attempts. Try again in {} minute(s)",
                    minutes_remaining
                ),
            ),
            AuthApiError::AccountDeactivated => (
                StatusCode::UNAUTHORIZED,
                "ACCOUNT_DEACTIVATED",
                "Account has been deactivated".to_string(),
            ),
            AuthApiError::InvalidOtp => (
                StatusCode::UNAUTHORIZED,
                "INVALID_OTP",
                "Invalid OTP".to_string(),
            ),
            AuthApiError::InvalidResetToken => (
                StatusCode::BAD_REQUEST,
                "INVALID_RESET_TOKEN",
                "Invalid or expired reset token".to_string(),
            ),
            AuthApiError::InvalidRole => (
                StatusCode::BAD_REQUEST,
                "INVALID_ROLE",
                "Role must be one of admin, editor, customer".to_string(),
            ),
            AuthApiError::InvalidUserId => (
                StatusCode::BAD_REQUEST,
                "INVALID_USER_ID",
                "Invalid user ID format".to_string(),
            ),
            AuthApiError::OwnAccount(msg) => {
                (StatusCode::BAD_REQUEST, "OWN_ACCOUNT", msg.to_string())
            }
            AuthApiError::UserNotFound => (
                StatusCode::NOT_FOUND,
                "USER_NOT_FOUND",
                "User not found".to_string(),
            ),
            AuthApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

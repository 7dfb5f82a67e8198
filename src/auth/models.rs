//! Authentication Models
//! Mission: Define secure account and credential data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: UserRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User roles for RBAC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin, // Full access including account administration
    #[serde(rename = "editor")]
    Editor, // Product catalog management
    #[serde(rename = "customer")]
    Customer, // Browsing and checkout
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Editor => "editor",
            UserRole::Customer => "customer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "editor" => Some(UserRole::Editor),
            "customer" => Some(UserRole::Customer),
            _ => None,
        }
    }

    /// Whether this role may manage the product catalog.
    pub fn can_edit_products(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Editor)
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (account id)
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub exp: usize, // expiration timestamp
}

/// Registration request body. Fields are optional so a missing one produces a
/// 400 validation error instead of a body rejection. There is no `role` field;
/// registration always yields a customer.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// OTP login request body
#[derive(Debug, Deserialize)]
pub struct OtpLoginRequest {
    pub phone: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Option<String>,
}

/// Login/registration response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: usize, // seconds until expiration
    pub user: UserResponse,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "gamer1".to_string(),
            email: "a@b.com".to_string(),
            phone: None,
            password_hash: "secret-hash".to_string(),
            role: UserRole::Customer,
            is_active: true,
            last_login: None,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_role_serialization() {
        let admin = UserRole::Admin;
        let json = serde_json::to_string(&admin).unwrap();
        assert_eq!(json, r#""admin""#);

        let editor: UserRole = serde_json::from_str(r#""editor""#).unwrap();
        assert_eq!(editor, UserRole::Editor);
    }

    #[test]
    fn test_user_role_string_conversion() {
        assert_eq!(UserRole::Admin.as_str(), "admin");
        assert_eq!(UserRole::from_str("CUSTOMER"), Some(UserRole::Customer));
        assert_eq!(UserRole::from_str("viewer"), None);
    }

    #[test]
    fn test_editor_rights() {
        assert!(UserRole::Admin.can_edit_products());
        assert!(UserRole::Editor.can_edit_products());
        assert!(!UserRole::Customer.can_edit_products());
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = sample_user();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("secret-hash"));

        let response = serde_json::to_string(&UserResponse::from_user(&user)).unwrap();
        assert!(!response.contains("password"));
        assert!(!response.contains("secret-hash"));
    }

    #[test]
    fn test_register_request_tolerates_role_field() {
        let body = r#"{"username":"gamer1","email":"a@b.com","password":"Abcd1234","role":"admin"}"#;
        let parsed: RegisterRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.username.as_deref(), Some("gamer1"));
    }
}

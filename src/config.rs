//! Server Configuration
//! Mission: Centralize every tunable in one env-driven struct

use crate::auth::lockout;
use std::time::Duration;

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    /// Origins allowed through CORS. Requests from any other origin fail the
    /// preflight.
    pub cors_allowed_origins: Vec<String>,
    /// Fixed demo OTP accepted by the phone login endpoint.
    pub demo_otp: String,

    // Login lockout
    pub lockout_threshold: u32,
    pub lockout_window_mins: i64,

    // Rate limiting: general API budget and the stricter auth budget
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub auth_rate_limit_max: u32,
    pub auth_rate_limit_window: Duration,

    // Response cache
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_invalidate_on_write: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./storefront.db".to_string());

        let jwt_secret = std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let demo_otp = std::env::var("DEMO_OTP").unwrap_or_else(|_| "123456".to_string());

        let lockout_threshold = env_parse("LOCKOUT_THRESHOLD", lockout::DEFAULT_THRESHOLD);
        let lockout_window_mins = env_parse("LOCKOUT_WINDOW_MINS", lockout::DEFAULT_WINDOW_MINS);

        let rate_limit_max = env_parse("RATE_LIMIT_MAX", 100u32);
        let rate_limit_window = Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", 900u64));
        let auth_rate_limit_max = env_parse("AUTH_RATE_LIMIT_MAX", 10u32);
        let auth_rate_limit_window =
            Duration::from_secs(env_parse("AUTH_RATE_LIMIT_WINDOW_SECS", 3600u64));

        let cache_ttl = Duration::from_secs(env_parse("CACHE_TTL_SECS", 300u64));
        let cache_max_entries = env_parse("CACHE_MAX_ENTRIES", 100usize);
        let cache_invalidate_on_write = std::env::var("CACHE_INVALIDATE_ON_WRITE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        Self {
            port,
            database_path,
            jwt_secret,
            cors_allowed_origins,
            demo_otp,
            lockout_threshold,
            lockout_window_mins,
            rate_limit_max,
            rate_limit_window,
            auth_rate_limit_max,
            auth_rate_limit_window,
            cache_ttl,
            cache_max_entries,
            cache_invalidate_on_write,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Only check vars unlikely to be set in test environments
        let config = Config::from_env();
        assert_eq!(config.lockout_threshold, 5);
        assert_eq!(config.lockout_window_mins, 15);
        assert_eq!(config.cache_max_entries, 100);
        assert!(!config.cache_invalidate_on_write);
        assert_eq!(config.auth_rate_limit_max, 10);
    }
}

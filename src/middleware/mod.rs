//! Middleware for observability and request hardening.
//!
//! This module provides:
//! - Request logging with latency tracking
//! - Rate limiting per IP address
//! - Response caching for idempotent product reads

pub mod logging;
pub mod rate_limit;
pub mod response_cache;

pub use logging::request_logging;
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimiter};
pub use response_cache::{response_cache_middleware, CacheStats, ResponseCache};

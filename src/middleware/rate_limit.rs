//! Rate limiting middleware.
//!
//! In-memory per-IP budgets over a sliding window. Two instances run in the
//! app: a general API budget and a stricter budget on authentication routes.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for one rate-limit budget.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window. Request N is accepted, request N+1 within
    /// the same window is rejected.
    pub max_requests: u32,
    /// Window duration. The budget resets when the window rolls over.
    pub window: Duration,
    /// Fixed advisory message returned on rejection.
    pub message: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(900),
            message: "Too many requests. Please slow down.".to_string(),
        }
    }
}

/// Rate limiter state tracking requests per IP.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, WindowEntry>>>,
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count this request against the IP's window and decide.
    fn check(&self, ip: IpAddr) -> Decision {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > self.config.max_requests {
            let reset_at = entry.window_start + self.config.window;
            Decision::Exceeded {
                retry_after: reset_at.duration_since(now),
            }
        } else {
            Decision::Allowed
        }
    }

    /// Periodic cleanup of idle entries (call from a background task).
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

enum Decision {
    Allowed,
    Exceeded { retry_after: Duration },
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match limiter.check(ip) {
        Decision::Allowed => next.run(request).await,
        Decision::Exceeded { retry_after } => {
            warn!(
                ip = %ip,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "error": limiter.config.message,
                "code": "RATE_LIMIT_EXCEEDED",
                "retry_after_seconds": retry_after.as_secs(),
            });

            let retry_secs = retry_after.as_secs().to_string();
            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    ("Retry-After", retry_secs.clone()),
                    ("X-RateLimit-Limit", limiter.config.max_requests.to_string()),
                    ("X-RateLimit-Remaining", "0".to_string()),
                    ("X-RateLimit-Reset", retry_secs),
                ],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

/// Resolve the client IP: X-Forwarded-For (first hop) when present, else the
/// peer address, else loopback (e.g. in-process test requests).
fn client_ip(request: &Request<Body>) -> IpAddr {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .and_then(|s| s.parse().ok())
        {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

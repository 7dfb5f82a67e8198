//! Response caching middleware.
//!
//! Short-TTL in-memory cache for idempotent product reads. Entries are keyed
//! by the full request path + query string and bounded by a FIFO eviction on
//! entry count. The cache is an explicit object built once at startup and
//! passed through router state, so tests can construct their own and another
//! backend could replace it without touching handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cache counters and occupancy, for the ops endpoint.
#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_seconds: u64,
}

struct CacheEntry {
    body: Bytes,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // Insertion order for FIFO eviction (oldest at the front)
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

/// TTL + size bounded response cache.
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    invalidate_on_write: bool,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize, invalidate_on_write: bool) -> Self {
        Self {
            ttl,
            max_entries,
            invalidate_on_write,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Fresh-entry lookup. Counts a hit or a miss; a stale entry is dropped
    /// and counted as a miss.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();

        let fresh = match inner.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() < self.ttl,
            None => false,
        };

        if fresh {
            inner.hits += 1;
            return inner.entries.get(key).map(|e| e.body.clone());
        }

        if inner.entries.remove(key).is_some() {
            inner.order.retain(|k| k != key);
        }
        inner.misses += 1;
        None
    }

    /// Store a payload. Re-inserting an existing key refreshes it and moves
    /// it to the back of the eviction order. Concurrent populations of the
    /// same key are last-write-wins; entries are idempotent re-derivations of
    /// the same read, so no guard is needed.
    pub fn insert(&self, key: String, body: Bytes) {
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                body,
                inserted_at: Instant::now(),
            },
        );

        // FIFO: drop the oldest-inserted entry once over capacity
        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!("Cache evicted oldest entry: {}", oldest);
        }
    }

    /// Whether product mutations should purge read entries.
    pub fn invalidate_on_write(&self) -> bool {
        self.invalidate_on_write
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many
    /// were removed.
    pub fn purge_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        inner.order.retain(|k| !k.starts_with(prefix));
        before - inner.entries.len()
    }

    /// Drop all entries and reset counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

/// Middleware for cacheable read routes. Serves fresh entries directly and
/// captures successful JSON responses on miss.
pub async fn response_cache_middleware(
    State(cache): State<Arc<ResponseCache>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    if let Some(body) = cache.get(&key) {
        debug!("Cache hit: {}", key);
        return (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (header::HeaderName::from_static("x-cache"), HeaderValue::from_static("HIT")),
            ],
            body,
        )
            .into_response();
    }

    let response = next.run(request).await;

    // Only successful payloads are worth replaying
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to buffer response for caching: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    cache.insert(key, bytes.clone());
    parts
        .headers
        .insert("x-cache", HeaderValue::from_static("MISS"));

    Response::from_parts(parts, Body::from(bytes))
}

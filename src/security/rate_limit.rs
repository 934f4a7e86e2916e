//! Windowed request counting per (client, route) key.
//!
//! Each key owns one [`RateLimitEntry`]. The first request in a window
//! creates the entry, later requests increment it, and once the window has
//! elapsed the next request starts a fresh window. Expired entries are
//! replaced on access; [`SlidingWindowLimiter::sweep`] only reclaims memory.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::{mapref::entry::Entry, DashMap};

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::http::path::{malformed_path, normalize_path};
use crate::observability::metrics;

/// Key component used when the client address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Limit and window length for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 60,
            window: Duration::from_millis(60_000),
        }
    }
}

/// Counting state for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u64,
    pub window_start: Instant,
}

impl RateLimitEntry {
    fn first(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// A `now` earlier than `window_start` counts as inside the window.
    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        self.elapsed(now) > window
    }
}

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u64, remaining: u64 },
    Limited { count: u64, retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// In-memory request counter keyed by caller-derived strings.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    entries: DashMap<String, RateLimitEntry>,
    policy: RateLimitPolicy,
}

impl SlidingWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Record a request for `key` at `now` and decide whether it is allowed.
    ///
    /// The shard lock taken by `entry` covers the whole
    /// read-check-increment sequence, so concurrent calls for one key are
    /// serialized.
    pub fn check_and_record(&self, key: &str, now: Instant) -> RateLimitDecision {
        let RateLimitPolicy { limit, window } = self.policy;

        match self.entries.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateLimitEntry::first(now));
                allowed(1, limit)
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now, window) {
                    *entry = RateLimitEntry::first(now);
                    return allowed(1, limit);
                }

                entry.count = entry.count.saturating_add(1);
                if entry.count <= limit {
                    allowed(entry.count, limit)
                } else {
                    RateLimitDecision::Limited {
                        count: entry.count,
                        retry_after: window.saturating_sub(entry.elapsed(now)),
                    }
                }
            }
        }
    }

    /// Remove every entry whose window has elapsed. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.policy.window;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn allowed(count: u64, limit: u64) -> RateLimitDecision {
    RateLimitDecision::Allowed {
        count,
        remaining: limit.saturating_sub(count),
    }
}

/// A limiter bound to every path under `prefix`.
#[derive(Debug)]
struct RouteLimiter {
    prefix: String,
    limiter: SlidingWindowLimiter,
}

/// Shared state for the rate limiting middleware.
#[derive(Debug)]
pub struct RateLimiterState {
    default: SlidingWindowLimiter,
    // Longest prefix first.
    routes: Vec<RouteLimiter>,
    exempt_paths: Vec<String>,
    trust_forwarded_headers: bool,
    clock: Arc<dyn Clock>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let mut routes: Vec<RouteLimiter> = config
            .routes
            .iter()
            .map(|route| RouteLimiter {
                prefix: route.path_prefix.clone(),
                limiter: SlidingWindowLimiter::new(RateLimitPolicy::new(
                    route.limit,
                    Duration::from_millis(route.window_ms),
                )),
            })
            .collect();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let now = clock.now();
        Self {
            default: SlidingWindowLimiter::new(RateLimitPolicy::new(
                config.limit,
                Duration::from_millis(config.window_ms),
            )),
            routes,
            exempt_paths: config.exempt_paths.clone(),
            trust_forwarded_headers: config.trust_forwarded_headers,
            clock,
            last_sweep: Mutex::new(now),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    fn limiter_for(&self, path: &str) -> &SlidingWindowLimiter {
        self.routes
            .iter()
            .find(|r| path.starts_with(r.prefix.as_str()))
            .map(|r| &r.limiter)
            .unwrap_or(&self.default)
    }

    /// The prefix of the route override owning `path`, for metric labels.
    pub fn route_label(&self, path: &str) -> &str {
        self.routes
            .iter()
            .find(|r| path.starts_with(r.prefix.as_str()))
            .map(|r| r.prefix.as_str())
            .unwrap_or("default")
    }

    /// Record a request for `key` against the limiter that owns `path`.
    pub fn check(&self, key: &str, path: &str, now: Instant) -> RateLimitDecision {
        self.limiter_for(path).check_and_record(key, now)
    }

    /// Sweep all limiters, at most once per default window.
    ///
    /// Skips when another request is already sweeping.
    pub fn maybe_sweep(&self, now: Instant) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.default.policy().window {
            return;
        }
        *last = now;
        drop(last);

        let removed = self.default.sweep(now)
            + self
                .routes
                .iter()
                .map(|r| r.limiter.sweep(now))
                .sum::<usize>();
        let remaining = self.entry_count();
        metrics::record_rate_limit_entries(remaining);
        tracing::debug!(removed, remaining, "Swept expired rate limit entries");
    }

    pub fn entry_count(&self) -> usize {
        self.default.len() + self.routes.iter().map(|r| r.limiter.len()).sum::<usize>()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Derive the client half of a rate limit key.
///
/// Forwarding headers are only consulted when the gateway sits behind a
/// trusted proxy. Falls back to [`UNKNOWN_CLIENT`].
pub fn client_identity(request: &Request<Body>, trust_forwarded_headers: bool) -> String {
    if trust_forwarded_headers {
        if let Some(ip) = forwarded_client(request.headers()) {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let from_xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let from_real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    from_xff.or_else(from_real_ip).map(str::to_owned)
}

/// Middleware enforcing the per (client, path) request limit.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(path) = normalize_path(request.uri().path()) else {
        return malformed_path();
    };
    if state.is_exempt(&path) {
        return next.run(request).await;
    }

    let client = client_identity(&request, state.trust_forwarded_headers);
    let key = format!("{client}:{path}");
    let now = state.clock.now();
    state.maybe_sweep(now);

    match state.check(&key, &path, now) {
        RateLimitDecision::Allowed { .. } => next.run(request).await,
        RateLimitDecision::Limited { count, retry_after } => {
            tracing::warn!(client = %client, path = %path, count, "Rate limit exceeded");
            metrics::record_rate_limited(state.route_label(&path));
            too_many_requests(retry_after)
        }
    }
}

/// Build the 429 rejection. `Retry-After` is whole seconds, at least 1.
pub fn too_many_requests(retry_after: Duration) -> Response {
    let secs = retry_after.as_millis().div_ceil(1000).max(1);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        Json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "message": "Too many requests, please try again later.",
        })),
    )
        .into_response()
}

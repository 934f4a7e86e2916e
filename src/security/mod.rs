//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per client + path request counting)
//!     → auth guard (role-gated routes)
//!     → Pass to upstream
//!
//! Outgoing response:
//!     → headers.rs (CSP, frame, sniffing, referrer, permissions)
//! ```
//!
//! # Design Decisions
//! - Rate limit state is owned by the server, never a global
//! - Rejections are responses, not errors
//! - Single-process scope: counters are not shared between instances

pub mod headers;
pub mod rate_limit;

pub use headers::SecurityHeaders;
pub use rate_limit::{
    rate_limit_middleware, RateLimitDecision, RateLimitEntry, RateLimitPolicy, RateLimiterState,
    SlidingWindowLimiter,
};

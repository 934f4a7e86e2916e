//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable via `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Pretty format for development, compact for production

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(log_level: &str, is_development: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("referral_gateway={log_level},tower_http={log_level}").into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if is_development {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

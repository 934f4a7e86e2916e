//! Startup errors.

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;

/// Anything that can stop the gateway from starting.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth provider setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid upstream address: {0}")]
    InvalidUpstream(#[from] axum::http::uri::InvalidUri),

    #[error("Invalid security header policy: {0}")]
    InvalidSecurityHeaders(#[from] axum::http::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

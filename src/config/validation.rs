//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and windows > 0, addresses parse)
//! - Listener and upstream take `host:port` (names resolve at bind/connect
//!   time), the metrics listener needs a literal socket address
//! - Check that the security header table can be built
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::security::SecurityHeaders;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("{field} must be host:port: {value}")]
    InvalidHostPort { field: String, value: String },

    #[error("{field} must start with '/': {value}")]
    InvalidPathPrefix { field: String, value: String },

    #[error("auth.provider_url is required when auth is enabled")]
    MissingProviderUrl,

    #[error("auth.provider_url is not a valid URL: {0}")]
    InvalidProviderUrl(String),

    #[error("security.connect_sources produce an invalid Content-Security-Policy header")]
    InvalidConnectSources,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_host_port(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_host_port(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.upstream.request_timeout_secs == 0 {
        errors.push(zero("upstream.request_timeout_secs"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.limit == 0 {
        errors.push(zero("rate_limit.limit"));
    }
    if rate_limit.window_ms == 0 {
        errors.push(zero("rate_limit.window_ms"));
    }
    for (i, path) in rate_limit.exempt_paths.iter().enumerate() {
        check_prefix(&mut errors, &format!("rate_limit.exempt_paths[{i}]"), path);
    }
    for (i, route) in rate_limit.routes.iter().enumerate() {
        check_prefix(
            &mut errors,
            &format!("rate_limit.routes[{i}].path_prefix"),
            &route.path_prefix,
        );
        if route.limit == 0 {
            errors.push(zero(&format!("rate_limit.routes[{i}].limit")));
        }
        if route.window_ms == 0 {
            errors.push(zero(&format!("rate_limit.routes[{i}].window_ms")));
        }
    }

    if config.security.enable_headers
        && SecurityHeaders::new(config.security.is_development, &config.security.connect_sources)
            .is_err()
    {
        errors.push(ValidationError::InvalidConnectSources);
    }

    let auth = &config.auth;
    if auth.enabled {
        if auth.provider_url.is_empty() {
            errors.push(ValidationError::MissingProviderUrl);
        } else if url::Url::parse(&auth.provider_url).is_err() {
            errors.push(ValidationError::InvalidProviderUrl(auth.provider_url.clone()));
        }
        if auth.request_timeout_secs == 0 {
            errors.push(zero("auth.request_timeout_secs"));
        }
        check_prefix(&mut errors, "auth.login_path", &auth.login_path);
        check_prefix(&mut errors, "auth.forbidden_redirect", &auth.forbidden_redirect);
        for (i, rule) in auth.rules.iter().enumerate() {
            check_prefix(
                &mut errors,
                &format!("auth.rules[{i}].path_prefix"),
                &rule.path_prefix,
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn zero(field: &str) -> ValidationError {
    ValidationError::Zero {
        field: field.to_string(),
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

fn check_host_port(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    let valid = Authority::from_str(value)
        .map(|a| !a.host().is_empty() && a.port_u16().is_some() && !a.as_str().contains('@'))
        .unwrap_or(false);
    if !valid {
        errors.push(ValidationError::InvalidHostPort {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

fn check_prefix(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::InvalidPathPrefix {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

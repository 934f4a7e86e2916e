//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The web application requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Security header policy.
    pub security: SecurityConfig,

    /// Role-gated routes and the session provider.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per window per client and path.
    pub limit: u64,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Take the client address from X-Forwarded-For / X-Real-IP.
    /// Only safe behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,

    /// Path prefixes that are never counted.
    pub exempt_paths: Vec<String>,

    /// Per-route overrides. Longest matching prefix wins.
    pub routes: Vec<RouteRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 60,
            window_ms: 60_000,
            trust_forwarded_headers: false,
            exempt_paths: vec![
                "/_next/static".to_string(),
                "/_next/image".to_string(),
                "/favicon.ico".to_string(),
                "/healthz".to_string(),
            ],
            routes: Vec::new(),
        }
    }
}

/// A stricter or looser limit for one group of paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteRateLimit {
    /// Path prefix this limit applies to.
    pub path_prefix: String,

    /// Maximum requests per window.
    pub limit: u64,

    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_window_ms() -> u64 {
    60_000
}

/// Security header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,

    /// Relaxed CSP for local development (eval, websockets).
    pub is_development: bool,

    /// Extra origins allowed in `connect-src` (the hosted backend).
    pub connect_sources: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            is_development: false,
            connect_sources: Vec::new(),
        }
    }
}

/// Role a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredRole {
    /// Any signed-in user.
    User,
    /// Administrators only.
    Admin,
}

/// A guarded path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessRule {
    pub path_prefix: String,
    pub role: RequiredRole,
}

/// Route guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable the route guard.
    pub enabled: bool,

    /// Base URL of the hosted auth service.
    pub provider_url: String,

    /// Public API key sent with every provider call.
    pub api_key: String,

    /// Cookie carrying the session access token.
    pub session_cookie: String,

    /// Where unauthenticated page requests are sent.
    pub login_path: String,

    /// Where signed-in users without the required role are sent.
    pub forbidden_redirect: String,

    /// Emails always treated as administrators.
    pub admin_emails: Vec<String>,

    /// Provider call timeout in seconds.
    pub request_timeout_secs: u64,

    /// Guarded routes.
    pub rules: Vec<AccessRule>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider_url: String::new(),
            api_key: String::new(),
            session_cookie: "sb-access-token".to_string(),
            login_path: "/login".to_string(),
            forbidden_redirect: "/".to_string(),
            admin_emails: Vec::new(),
            request_timeout_secs: 5,
            rules: vec![
                AccessRule {
                    path_prefix: "/admin".to_string(),
                    role: RequiredRole::Admin,
                },
                AccessRule {
                    path_prefix: "/api/admin".to_string(),
                    role: RequiredRole::Admin,
                },
                AccessRule {
                    path_prefix: "/dashboard".to_string(),
                    role: RequiredRole::User,
                },
            ],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

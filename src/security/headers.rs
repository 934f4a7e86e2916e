//! Security response headers.
//!
//! # Responsibilities
//! - Build the fixed header set sent with every response
//! - Switch the Content-Security-Policy between development and production
//!
//! # Design Decisions
//! - Policy is computed once at startup; applying it is stateless
//! - Headers override whatever the upstream application set
//! - Development CSP allows eval and websocket connections for live reload

use axum::{
    http::{header, HeaderName, HeaderValue},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// The complete set of security headers for one environment.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Build the header table. Fails only when a connect source is not
    /// valid header text.
    pub fn new(
        is_development: bool,
        connect_sources: &[String],
    ) -> Result<Self, header::InvalidHeaderValue> {
        let csp = content_security_policy(is_development, connect_sources);

        let headers = vec![
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (
                header::REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
            (
                PERMISSIONS_POLICY,
                HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
            ),
            (header::CONTENT_SECURITY_POLICY, HeaderValue::from_str(&csp)?),
        ];

        Ok(Self { headers })
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Wrap `router` so every response carries these headers.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.headers.iter().fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(
                name.clone(),
                value.clone(),
            ))
        })
    }
}

/// Render the Content-Security-Policy directive list.
pub fn content_security_policy(is_development: bool, connect_sources: &[String]) -> String {
    let script_src = if is_development {
        "script-src 'self' 'unsafe-inline' 'unsafe-eval'"
    } else {
        "script-src 'self' 'unsafe-inline'"
    };

    let mut connect_src = String::from("connect-src 'self'");
    for source in connect_sources {
        connect_src.push(' ');
        connect_src.push_str(source);
    }
    if is_development {
        connect_src.push_str(" ws: wss:");
    }

    [
        "default-src 'self'",
        script_src,
        "style-src 'self' 'unsafe-inline'",
        "img-src 'self' data: https:",
        "font-src 'self' data:",
        &connect_src,
        "frame-ancestors 'none'",
        "base-uri 'self'",
        "form-action 'self'",
    ]
    .join("; ")
}

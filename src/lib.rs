//! Rate-limiting gateway for the referral web application.
//!
//! Sits in front of the public site and admin panel: counts requests per
//! client and path, attaches security headers, gates admin and dashboard
//! routes on a session validated by the hosted auth service, and forwards
//! the rest upstream.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;

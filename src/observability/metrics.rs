//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method and status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): 429s by route group
//! - `gateway_rate_limit_entries` (gauge): live rate limit buckets
//! - `gateway_auth_rejections_total` (counter): guard rejections by reason
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape listener. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Middleware counting every response the gateway sends, including the
/// ones produced by the limiter and the guard.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    record_request(&method, response.status().as_u16(), start);
    response
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(route: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_rate_limit_entries(count: usize) {
    metrics::gauge!("gateway_rate_limit_entries").set(count as f64);
}

pub fn record_auth_rejection(reason: &'static str) {
    metrics::counter!("gateway_auth_rejections_total", "reason" => reason).increment(1);
}

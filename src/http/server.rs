//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health endpoint and upstream fallback
//! - Wire up middleware (request ID, tracing, headers, rate limit, guard)
//! - Bind server to listener
//! - Graceful shutdown on the lifecycle broadcast
//!
//! # Middleware order (outermost first)
//! ```text
//! request id → trace → metrics → security headers → path normalization
//!     → rate limit → route guard → timeout → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{auth_guard_middleware, AuthProvider, GuardState, RemoteAuthProvider};
use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::path::normalize_path_middleware;
use crate::http::request::UuidRequestId;
use crate::http::upstream::Upstream;
use crate::observability::metrics;
use crate::security::{rate_limit_middleware, RateLimiterState, SecurityHeaders};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Upstream,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    rate_limiter: Option<Arc<RateLimiterState>>,
}

impl GatewayServer {
    /// Create a server with the system clock and, when the guard is
    /// enabled, the remote auth provider.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let provider: Option<Arc<dyn AuthProvider>> = if config.auth.enabled {
            Some(Arc::new(RemoteAuthProvider::new(&config.auth)?))
        } else {
            None
        };
        Self::with_components(config, Arc::new(SystemClock), provider)
    }

    /// Create a server with an explicit clock and auth provider.
    ///
    /// The route guard is installed only when `config.auth.enabled` is set
    /// and a provider is given.
    pub fn with_components(
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
        auth_provider: Option<Arc<dyn AuthProvider>>,
    ) -> Result<Self, GatewayError> {
        let state = AppState {
            upstream: Upstream::new(&config.upstream.address)?,
        };

        let rate_limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiterState::new(&config.rate_limit, clock)));

        let guard = match auth_provider {
            Some(provider) if config.auth.enabled => {
                Some(Arc::new(GuardState::new(&config.auth, provider)))
            }
            _ => None,
        };

        let headers = if config.security.enable_headers {
            Some(SecurityHeaders::new(
                config.security.is_development,
                &config.security.connect_sources,
            )?)
        } else {
            None
        };

        let router = Self::build_router(&config, state, rate_limiter.clone(), guard, headers);
        Ok(Self {
            router,
            config,
            rate_limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        rate_limiter: Option<Arc<RateLimiterState>>,
        guard: Option<Arc<GuardState>>,
        headers: Option<SecurityHeaders>,
    ) -> Router {
        let mut router = Router::new()
            .route("/healthz", get(health_handler))
            .fallback(forward_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.upstream.request_timeout_secs,
            )));

        if let Some(guard) = guard {
            router = router.layer(middleware::from_fn_with_state(guard, auth_guard_middleware));
        }
        if let Some(limiter) = rate_limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }
        router = router.layer(middleware::from_fn(normalize_path_middleware));
        if let Some(headers) = headers {
            router = headers.apply(router);
        }

        router
            .layer(middleware::from_fn(metrics::track_requests))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router, for driving the gateway without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiterState>> {
        self.rate_limiter.as_ref()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            rate_limit = self.config.rate_limit.enabled,
            auth_guard = self.config.auth.enabled,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Everything the gateway does not answer itself goes upstream.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.upstream.forward(request).await
}

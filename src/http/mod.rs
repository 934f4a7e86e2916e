//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → path.rs (canonical request path)
//!     → [security + auth middleware]
//!     → upstream.rs (forward to the web application)
//!     → Send to client
//! ```

pub mod path;
pub mod request;
pub mod server;
pub mod upstream;

pub use path::{normalize_path, normalize_path_middleware};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
pub use upstream::Upstream;

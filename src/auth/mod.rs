//! Route guard subsystem.
//!
//! # Data Flow
//! ```text
//! Request to guarded path
//!     → guard.rs (match AccessRule, extract session token)
//!     → provider.rs / remote.rs (validate session with the auth service)
//!     → identity.rs (AdminDirectory resolves the role)
//!     → guard.rs (redirect, JSON error, or forward with identity headers)
//! ```
//!
//! # Design Decisions
//! - The gateway never issues sessions; it only asks the provider
//! - Admin status is decided in one place (AdminDirectory)
//! - Provider outages fail closed on guarded routes

pub mod guard;
pub mod identity;
pub mod provider;
pub mod remote;

pub use guard::{auth_guard_middleware, GuardState, USER_ID_HEADER, USER_ROLE_HEADER};
pub use identity::{AdminDirectory, Identity, Role};
pub use provider::{AuthError, AuthProvider, StaticAuthProvider};
pub use remote::RemoteAuthProvider;

//! Session validation seam.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::identity::Identity;

/// Failures talking to the auth provider. An invalid session is not an
/// error; it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Auth provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Auth provider returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Validates session tokens and reports who they belong to.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Option<Identity>, AuthError>;
}

/// Fixed token table, for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthProvider {
    sessions: HashMap<String, Identity>,
}

impl StaticAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.sessions.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn validate(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.sessions.get(token).cloned())
    }
}

//! Session validation against the hosted auth service.
//!
//! Calls `GET {provider_url}/auth/v1/user` with the project API key and the
//! session token as a Bearer credential.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::auth::identity::{AdminDirectory, Identity};
use crate::auth::provider::{AuthError, AuthProvider};
use crate::config::AuthConfig;

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    role: Option<String>,
}

/// [`AuthProvider`] backed by the hosted auth service's user endpoint.
#[derive(Debug, Clone)]
pub struct RemoteAuthProvider {
    client: reqwest::Client,
    user_endpoint: Url,
    api_key: String,
    directory: AdminDirectory,
}

impl RemoteAuthProvider {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut base = Url::parse(&config.provider_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let user_endpoint = base.join("auth/v1/user")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            user_endpoint,
            api_key: config.api_key.clone(),
            directory: AdminDirectory::new(&config.admin_emails),
        })
    }

    pub fn user_endpoint(&self) -> &Url {
        &self.user_endpoint
    }
}

#[async_trait]
impl AuthProvider for RemoteAuthProvider {
    async fn validate(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let response = self
            .client
            .get(self.user_endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let user: UserResponse = response.json().await?;
                Ok(Some(self.directory.identify(
                    user.id,
                    user.email,
                    user.app_metadata.role.as_deref(),
                )))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(AuthError::UnexpectedStatus(status.as_u16())),
        }
    }
}

//! Refresh token exchange.
//!
//! [`TokenRefresher`] is the seam between the interceptor and the refresh
//! endpoint. [`HttpRefresher`] talks to the backend with the raw HTTP client,
//! so a refresh never passes back through the interceptor.

use async_trait::async_trait;
use estate_admin_core::{CredentialPair, Secret};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;
use crate::request::resolve_url;
use crate::types::TokenResponse;

/// Error exchanging a refresh token.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Transport failure, timeout, or undecodable response.
    #[error("refresh request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint rejected the refresh token.
    #[error("refresh endpoint returned {status}")]
    Rejected { status: StatusCode },
}

/// Exchanges a refresh token for a new credential pair.
///
/// Implementations make a single attempt; retries are not part of the contract.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &Secret) -> Result<CredentialPair, RefreshError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refresher calling `POST <refresh_path>` with `{ "refreshToken": ... }`.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            timeout,
        }
    }

    /// Build a refresher for the endpoint named in `config`.
    pub fn from_config(
        http: reqwest::Client,
        config: &ClientConfig,
    ) -> Result<Self, crate::ApiError> {
        let endpoint = resolve_url(&config.api_base()?, &config.refresh_path)?;
        Ok(Self::new(http, endpoint, config.timeout()))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &Secret) -> Result<CredentialPair, RefreshError> {
        tracing::debug!("Requesting new token pair from {}", self.endpoint);

        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected { status });
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.into_pair())
    }
}

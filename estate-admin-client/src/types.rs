use estate_admin_core::CredentialPair;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Errors that can occur when talking to the admin backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The client configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Transport failure, timeout, or undecodable response.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The request body could not be serialized.
    #[error("invalid request body: {0}")]
    Body(serde_json::Error),

    /// The response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(serde_json::Error),
}

impl ApiError {
    /// The HTTP status, if the backend answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the backend rejected the request as unauthenticated.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// Result type alias using [`ApiError`].
pub type Result<T> = std::result::Result<T, ApiError>;

/// Token pair as returned by the login and refresh endpoints.
///
/// Accepts both the bare `{ accessToken, refreshToken }` shape and the same
/// object wrapped in a `data` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenResponse {
    Bare(CredentialPair),
    Enveloped { data: CredentialPair },
}

impl TokenResponse {
    pub fn into_pair(self) -> CredentialPair {
        match self {
            Self::Bare(pair) | Self::Enveloped { data: pair } => pair,
        }
    }
}

/// Admin resource collections exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Listings,
    Users,
    Memberships,
    PremiumPricing,
    Promotions,
    News,
    Reports,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Self::Listings,
        Self::Users,
        Self::Memberships,
        Self::PremiumPricing,
        Self::Promotions,
        Self::News,
        Self::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listings => "listings",
            Self::Users => "users",
            Self::Memberships => "memberships",
            Self::PremiumPricing => "premium-pricing",
            Self::Promotions => "promotions",
            Self::News => "news",
            Self::Reports => "reports",
        }
    }

    /// Collection path relative to the API base URL.
    pub fn path(&self) -> String {
        format!("/{}", self.as_str())
    }

    /// Path of a single item in the collection.
    pub fn item_path(&self, id: &str) -> String {
        format!("/{}/{}", self.as_str(), id)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown resource: {}", s))
    }
}

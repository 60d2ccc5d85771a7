//! Domain model types for the estate admin client.
//!
//! This module defines:
//! - [`CredentialPair`] - The access/refresh token pair issued by the backend
//! - [`CookiePolicy`] - Lifetimes and attributes of the stored token cookies
//! - [`SameSite`] - Cookie same-site attribute
//! - [`Session`] - A read-only summary of the stored credentials

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::claims::TokenClaims;
use crate::store::Secret;

/// Cookie name for the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Cookie name for the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Access token cookie lifetime in days.
pub const ACCESS_TOKEN_TTL_DAYS: i64 = 7;

/// Refresh token cookie lifetime in days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Credentials issued by the backend on login or refresh.
///
/// The wire shape is `{ "accessToken": "...", "refreshToken": "..." }`, where
/// the refresh token is optional.
///
/// # Examples
///
/// ```
/// use estate_admin_core::CredentialPair;
///
/// let pair: CredentialPair =
///     serde_json::from_str(r#"{"accessToken":"a","refreshToken":"r"}"#).unwrap();
/// assert_eq!(pair.access_token.expose(), "a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    /// Short-lived bearer credential.
    pub access_token: Secret,

    /// Longer-lived credential used to obtain a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,
}

impl CredentialPair {
    /// Create a pair with only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: None,
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }
}

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        };
        write!(f, "{}", value)
    }
}

/// Lifetimes and attributes applied when token cookies are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    /// How long the access token cookie lives.
    pub access_ttl: Duration,

    /// How long the refresh token cookie lives.
    pub refresh_ttl: Duration,

    /// Whether cookies are restricted to secure transports.
    pub secure: bool,

    /// Same-site attribute.
    pub same_site: SameSite,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::days(ACCESS_TOKEN_TTL_DAYS),
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
            secure: true,
            same_site: SameSite::Strict,
        }
    }
}

/// Summary of the stored credentials, derived without any network access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Admin identifier from the access token's `sub` claim.
    pub subject: Option<String>,

    /// When the access token expires, if it carries an `exp` claim.
    pub access_expires_at: Option<DateTime<Utc>>,

    /// Whether a refresh token is stored.
    pub has_refresh_token: bool,

    /// When the refresh token expires, if it is a JWT with an `exp` claim.
    pub refresh_expires_at: Option<DateTime<Utc>>,

    /// Whether the access token is expired right now.
    pub access_expired: bool,
}

impl Session {
    /// Build a session summary from a stored pair.
    ///
    /// Tokens that are not decodable JWTs yield no subject and no expiry.
    pub fn from_pair(pair: &CredentialPair) -> Self {
        let access = TokenClaims::decode(pair.access_token.expose()).ok();
        let refresh = pair
            .refresh_token
            .as_ref()
            .and_then(|t| TokenClaims::decode(t.expose()).ok());

        Self {
            subject: access.as_ref().and_then(|c| c.sub.clone()),
            access_expires_at: access.as_ref().and_then(TokenClaims::expires_at),
            has_refresh_token: pair.refresh_token.is_some(),
            refresh_expires_at: refresh.as_ref().and_then(TokenClaims::expires_at),
            access_expired: access
                .as_ref()
                .map(|c| c.is_expired_at(Utc::now(), Duration::zero()))
                .unwrap_or(false),
        }
    }
}

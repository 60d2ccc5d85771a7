//! JWT claim inspection.
//!
//! The client never holds the signing key, so tokens are only decoded, never
//! verified. The backend remains the authority on whether a token is valid;
//! the client reads `exp` to decide when to refresh and `sub` to derive the
//! admin identity header.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Error decoding token claims.
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The token does not have the `header.payload.signature` shape.
    #[error("malformed token: expected 3 segments, got {segments}")]
    Malformed { segments: usize },

    /// The payload segment is not valid base64url.
    #[error("invalid payload encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The payload is not a JSON claims object.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The subset of registered JWT claims the client cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Subject; the admin identifier. Numeric subjects are rendered as strings.
    #[serde(default, deserialize_with = "string_or_number")]
    pub sub: Option<String>,

    /// Expiration time as Unix seconds.
    #[serde(default)]
    pub exp: Option<i64>,

    /// Issued-at time as Unix seconds.
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Decode the payload of a JWT without verifying its signature.
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(ClaimsError::Malformed {
                segments: segments.len(),
            });
        }

        let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Expiration as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Whether the token is expired at `now`, treating tokens that expire
    /// within `leeway` as already expired.
    ///
    /// Tokens without an `exp` claim never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        self.exp
            .map(|exp| exp < (now + leeway).timestamp())
            .unwrap_or(false)
    }
}

/// Whether `token` is a JWT whose `exp` claim lies in the past.
///
/// Undecodable tokens are not considered expired; the server decides.
pub fn is_token_expired(token: &str, now: DateTime<Utc>, leeway: Duration) -> bool {
    match TokenClaims::decode(token) {
        Ok(claims) => claims.is_expired_at(now, leeway),
        Err(e) => {
            tracing::debug!("Token expiry unknown ({}), assuming valid", e);
            false
        }
    }
}

/// The `sub` claim of `token`, if it is a decodable JWT that carries one.
pub fn token_subject(token: &str) -> Option<String> {
    match TokenClaims::decode(token) {
        Ok(claims) => claims.sub,
        Err(e) => {
            tracing::debug!("No identity available from token: {}", e);
            None
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn mint(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_subject_and_expiry() {
        let token = mint(serde_json::json!({ "sub": "admin-42", "exp": 2_000_000_000 }));
        let claims = TokenClaims::decode(&token).unwrap();

        assert_eq!(claims.sub.as_deref(), Some("admin-42"));
        assert_eq!(claims.exp, Some(2_000_000_000));
        assert_eq!(
            claims.expires_at(),
            DateTime::from_timestamp(2_000_000_000, 0)
        );
    }

    #[test]
    fn test_numeric_subject() {
        let token = mint(serde_json::json!({ "sub": 17, "exp": 2_000_000_000 }));
        assert_eq!(token_subject(&token).as_deref(), Some("17"));
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let past = mint(serde_json::json!({ "exp": now.timestamp() - 1 }));
        let future = mint(serde_json::json!({ "exp": now.timestamp() + 3600 }));

        assert!(is_token_expired(&past, now, Duration::zero()));
        assert!(!is_token_expired(&future, now, Duration::zero()));
        assert!(is_token_expired(&future, now, Duration::hours(2)));
    }

    #[test]
    fn test_missing_exp_never_expires() {
        let token = mint(serde_json::json!({ "sub": "a" }));
        assert!(!is_token_expired(&token, Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            TokenClaims::decode("opaque"),
            Err(ClaimsError::Malformed { segments: 1 })
        ));
        assert!(matches!(
            TokenClaims::decode("a.!!!.c"),
            Err(ClaimsError::Encoding(_))
        ));
        assert!(token_subject("not-a-jwt").is_none());
        assert!(!is_token_expired("not-a-jwt", Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_non_json_payload() {
        let payload = URL_SAFE_NO_PAD.encode(b"not json");
        let token = format!("h.{}.s", payload);
        assert!(matches!(
            TokenClaims::decode(&token),
            Err(ClaimsError::Payload(_))
        ));
    }
}

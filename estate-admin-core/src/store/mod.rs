//! Credential storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for token values that prevents accidental logging
//! - [`CredentialStore`] - Trait for credential storage backends
//! - [`MemoryStore`] - In-memory implementation for tests and ephemeral sessions
//! - [`CookieStore`] - Cookie jar persisted to disk, with per-cookie expiry
//! - [`create_store`] - Helper to select a backend based on availability
//!
//! Stores are read synchronously. A store that cannot reach its backing
//! storage degrades to no-ops: `get` returns `None` and writes are dropped.
//!
//! # Example
//!
//! ```rust
//! use estate_admin_core::{CredentialPair, CredentialStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.set(&CredentialPair::new("access").with_refresh_token("refresh"));
//!
//! let pair = store.get().unwrap();
//! assert_eq!(pair.access_token.expose(), "access");
//!
//! store.clear();
//! assert!(store.get().is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::CredentialPair;

mod cookie;
mod memory;

pub use cookie::{Cookie, CookieStore};
pub use memory::MemoryStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the backing memory is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage cannot be used in this execution context.
    #[error("credential storage unavailable: {message}")]
    Unavailable { message: String },

    /// I/O error reading or writing the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Abstraction over credential storage backends.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage
/// - [`CookieStore`] - Disk-persisted cookie jar
///
/// All operations are synchronous and infallible from the caller's point of
/// view. Backends that hit storage errors log them and behave as if the
/// credentials were absent.
pub trait CredentialStore: Send + Sync {
    /// Return the current credential pair.
    ///
    /// Returns `None` when no access token is stored.
    fn get(&self) -> Option<CredentialPair>;

    /// Store a credential pair, replacing the previous one.
    ///
    /// A pair without a refresh token leaves any stored refresh token in place.
    fn set(&self, pair: &CredentialPair);

    /// Store a credential pair wholesale.
    ///
    /// Unlike [`set`](CredentialStore::set), a pair without a refresh token
    /// removes the stored one. Used when a new session starts.
    fn replace(&self, pair: &CredentialPair) {
        self.clear();
        self.set(pair);
    }

    /// Remove both tokens.
    fn clear(&self);

    /// Return the stored refresh token.
    ///
    /// The refresh token can outlive the access token, so backends with
    /// independent expirations override this.
    fn refresh_token(&self) -> Option<Secret> {
        self.get().and_then(|pair| pair.refresh_token)
    }

    /// Whether this store can persist anything at all.
    fn is_available(&self) -> bool {
        true
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    fn get(&self) -> Option<CredentialPair> {
        (**self).get()
    }

    fn set(&self, pair: &CredentialPair) {
        (**self).set(pair)
    }

    fn replace(&self, pair: &CredentialPair) {
        (**self).replace(pair)
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn refresh_token(&self) -> Option<Secret> {
        (**self).refresh_token()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Create a credential store with automatic backend selection.
///
/// - With a path, opens a [`CookieStore`] backed by that file.
/// - Without one, or if the file cannot be opened, returns
///   [`CookieStore::unavailable`] and logs a warning. Credentials will not be
///   kept in that case and every request goes out unauthenticated.
pub fn create_store(path: Option<PathBuf>) -> Box<dyn CredentialStore> {
    let Some(path) = path else {
        tracing::warn!("No data directory available, credential storage disabled");
        return Box::new(CookieStore::unavailable());
    };

    match CookieStore::open(&path) {
        Ok(store) => {
            tracing::debug!("Using cookie jar at {:?}", path);
            Box::new(store)
        }
        Err(e) => {
            tracing::warn!(
                "Cookie jar at {:?} unusable ({}), credential storage disabled",
                path,
                e
            );
            Box::new(CookieStore::unavailable())
        }
    }
}

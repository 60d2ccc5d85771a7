//! # Estate Admin Core
//!
//! Core library for the estate admin API client.
//!
//! This crate provides:
//! - The [`CredentialPair`] issued by the admin backend on login and refresh
//! - JWT claim inspection for expiry and admin identity ([`claims`])
//! - The [`CredentialStore`] trait with in-memory and cookie-jar backends
//!
//! ## Quick Start
//!
//! ```rust
//! use estate_admin_core::{CredentialPair, CredentialStore, MemoryStore, Session};
//!
//! let store = MemoryStore::new();
//! store.set(&CredentialPair::new("opaque-token"));
//!
//! let session = store.get().map(|pair| Session::from_pair(&pair));
//! assert!(session.is_some());
//! ```

pub mod claims;
pub mod model;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{
    ACCESS_TOKEN_COOKIE,
    CookiePolicy,
    CredentialPair,
    REFRESH_TOKEN_COOKIE,
    SameSite,
    Session,
};

pub use store::{
    Cookie,
    CookieStore,
    CredentialStore,
    MemoryStore,
    Secret,
    StoreError,
    create_store,
};

pub use claims::{
    ClaimsError,
    TokenClaims,
    is_token_expired,
    token_subject,
};

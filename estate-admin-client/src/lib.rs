//! Estate Admin Client Library
//!
//! An async REST client for the real-estate marketplace admin backend. It
//! keeps the admin's access and refresh tokens in a credential store and
//! authorizes every request transparently.
//!
//! # Overview
//!
//! Each outgoing request goes through an [`AuthInterceptor`]:
//!
//! - requests marked skip-auth (login, refresh) are sent as-is
//! - a valid access token is attached as `Authorization: Bearer <token>`,
//!   together with an `X-Admin-Id` header taken from the token's `sub` claim
//! - an expired access token is exchanged for a new pair first; concurrent
//!   requests share a single refresh
//! - when the session cannot be recovered the store is cleared, subscribers
//!   receive [`AuthEvent::Unauthorized`], and the request is sent without
//!   credentials so the backend rejects it
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use estate_admin_client::{ApiClient, AuthEvent, ClientConfig};
//! use estate_admin_core::CookieStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = CookieStore::open("/tmp/estate-admin/cookies.json")?;
//!     let config = ClientConfig::load(ClientConfig::default_path().as_deref())?;
//!     let client = ApiClient::builder(config)
//!         .store(Arc::new(store))
//!         .build()?;
//!
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(AuthEvent::Unauthorized { reason }) = events.recv().await {
//!             eprintln!("session ended: {}", reason);
//!         }
//!     });
//!
//!     let users: Option<serde_json::Value> = client.get("/users").await;
//!     println!("{:?}", users);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! [`ApiClient::request`] and the verb helpers log failures and return
//! `None`; [`ApiClient::try_request`] returns the [`ApiError`] instead.

mod client;
pub mod config;
pub mod interceptor;
pub mod notify;
pub mod refresh;
pub mod request;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder};

pub use config::{ClientConfig, ConfigError};
pub use interceptor::{AuthInterceptor, AuthOutcome};
pub use notify::{AuthEvent, AuthNotifier, UnauthorizedReason};
pub use refresh::{HttpRefresher, RefreshError, TokenRefresher};
pub use request::ApiRequest;
pub use types::{ApiError, Resource, Result, TokenResponse};

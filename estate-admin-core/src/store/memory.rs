//! In-memory credential storage implementation.

use parking_lot::RwLock;

use super::{CredentialStore, Secret};
use crate::model::CredentialPair;

#[derive(Default)]
struct Slots {
    access_token: Option<Secret>,
    refresh_token: Option<Secret>,
}

/// In-memory credential store for tests and ephemeral sessions.
///
/// This store is not persistent; data is lost when the process exits.
/// Tokens never expire on their own here, only the claims inside them do.
#[derive(Default)]
pub struct MemoryStore {
    slots: RwLock<Slots>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory store holding an initial pair.
    pub fn with_pair(pair: CredentialPair) -> Self {
        let store = Self::new();
        store.set(&pair);
        store
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("MemoryStore")
            .field("has_access_token", &slots.access_token.is_some())
            .field("has_refresh_token", &slots.refresh_token.is_some())
            .finish()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<CredentialPair> {
        let slots = self.slots.read();
        let access_token = slots.access_token.clone()?;
        Some(CredentialPair {
            access_token,
            refresh_token: slots.refresh_token.clone(),
        })
    }

    fn set(&self, pair: &CredentialPair) {
        let mut slots = self.slots.write();
        slots.access_token = Some(pair.access_token.clone());
        if let Some(refresh_token) = &pair.refresh_token {
            slots.refresh_token = Some(refresh_token.clone());
        }
    }

    fn replace(&self, pair: &CredentialPair) {
        let mut slots = self.slots.write();
        slots.access_token = Some(pair.access_token.clone());
        slots.refresh_token = pair.refresh_token.clone();
    }

    fn clear(&self) {
        let mut slots = self.slots.write();
        slots.access_token = None;
        slots.refresh_token = None;
    }

    fn refresh_token(&self) -> Option<Secret> {
        self.slots.read().refresh_token.clone()
    }
}

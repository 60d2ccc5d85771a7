//! Disk-backed cookie jar for token storage.
//!
//! Tokens are kept as cookies with independent expirations: the access token
//! cookie lives for 7 days and the refresh token cookie for 30, both marked
//! `secure` and `SameSite=Strict`. Expired cookies read as absent and are
//! dropped on the next write.
//!
//! # Storage Location
//!
//! By default the jar lives at `<data dir>/estate-admin/cookies.json`
//! (see [`CookieStore::default_path`]). The file is rewritten atomically and
//! is readable by its owner only.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{CredentialStore, Secret, StoreError};
use crate::model::{
    ACCESS_TOKEN_COOKIE, CookiePolicy, CredentialPair, REFRESH_TOKEN_COOKIE, SameSite,
};

/// A single stored cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: Secret,
    pub expires_at: DateTime<Utc>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Cookie {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// On-disk format of the jar.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CookieJar {
    /// Version of the jar format (for future migrations).
    version: u32,

    cookies: Vec<Cookie>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self {
            version: 1,
            cookies: Vec::new(),
        }
    }
}

impl CookieJar {
    fn live(&self, name: &str, now: DateTime<Utc>) -> Option<&Cookie> {
        self.cookies
            .iter()
            .find(|c| c.name == name && c.is_live(now))
    }

    fn upsert(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    fn remove(&mut self, name: &str) {
        self.cookies.retain(|c| c.name != name);
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.cookies.retain(|c| c.is_live(now));
    }
}

enum Backing {
    /// No usable storage in this execution context.
    Unavailable,

    File {
        path: PathBuf,
        jar: RwLock<CookieJar>,
    },
}

/// Credential store persisting tokens as cookies in a JSON file.
///
/// # Thread Safety
///
/// The in-memory jar is guarded by a `RwLock`; every write is flushed to
/// disk before the lock is released.
pub struct CookieStore {
    backing: Backing,
    policy: CookiePolicy,
}

impl CookieStore {
    /// Default location of the cookie jar.
    ///
    /// Returns `None` when the platform has no data directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "estate-admin", "estate-admin")
            .map(|dirs| dirs.data_dir().join("cookies.json"))
    }

    /// Open the jar at `path`, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_policy(path, CookiePolicy::default())
    }

    /// Open the jar at `path` with a custom cookie policy.
    pub fn open_with_policy(
        path: impl AsRef<Path>,
        policy: CookiePolicy,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let jar = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                CookieJar::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            CookieJar::default()
        };

        Ok(Self {
            backing: Backing::File {
                path,
                jar: RwLock::new(jar),
            },
            policy,
        })
    }

    /// A store with no backing storage. Reads return `None`, writes are dropped.
    pub fn unavailable() -> Self {
        Self {
            backing: Backing::Unavailable,
            policy: CookiePolicy::default(),
        }
    }

    /// The file backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Unavailable => None,
            Backing::File { path, .. } => Some(path),
        }
    }

    /// The policy applied to newly written cookies.
    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    /// All live cookies, for inspection.
    pub fn cookies(&self) -> Vec<Cookie> {
        match &self.backing {
            Backing::Unavailable => Vec::new(),
            Backing::File { jar, .. } => {
                let now = Utc::now();
                jar.read()
                    .cookies
                    .iter()
                    .filter(|c| c.is_live(now))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Store a pair, reporting storage failures.
    ///
    /// A pair without a refresh token keeps the stored refresh cookie.
    pub fn try_set(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.write_pair(pair, false)
    }

    /// Replace both cookies with `pair`, reporting storage failures.
    ///
    /// A pair without a refresh token removes the stored refresh cookie.
    pub fn try_replace(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        self.write_pair(pair, true)
    }

    /// Remove both token cookies, reporting storage failures.
    pub fn try_clear(&self) -> Result<(), StoreError> {
        let Backing::File { path, jar } = &self.backing else {
            return Err(unavailable());
        };

        let mut jar = jar.write();
        jar.remove(ACCESS_TOKEN_COOKIE);
        jar.remove(REFRESH_TOKEN_COOKIE);
        save(path, &jar)
    }

    fn write_pair(&self, pair: &CredentialPair, replace: bool) -> Result<(), StoreError> {
        let Backing::File { path, jar } = &self.backing else {
            return Err(unavailable());
        };

        let now = Utc::now();
        let mut jar = jar.write();
        jar.purge_expired(now);
        jar.upsert(self.cookie(
            ACCESS_TOKEN_COOKIE,
            &pair.access_token,
            now + self.policy.access_ttl,
        ));
        match &pair.refresh_token {
            Some(refresh_token) => jar.upsert(self.cookie(
                REFRESH_TOKEN_COOKIE,
                refresh_token,
                now + self.policy.refresh_ttl,
            )),
            None if replace => jar.remove(REFRESH_TOKEN_COOKIE),
            None => {}
        }

        save(path, &jar)
    }

    fn cookie(&self, name: &str, value: &Secret, expires_at: DateTime<Utc>) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.clone(),
            expires_at,
            secure: self.policy.secure,
            same_site: self.policy.same_site,
        }
    }

    fn live_value(&self, name: &str) -> Option<Secret> {
        match &self.backing {
            Backing::Unavailable => None,
            Backing::File { jar, .. } => jar
                .read()
                .live(name, Utc::now())
                .map(|c| c.value.clone()),
        }
    }
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("path", &self.path())
            .field("policy", &self.policy)
            .finish()
    }
}

impl CredentialStore for CookieStore {
    fn get(&self) -> Option<CredentialPair> {
        let access_token = self.live_value(ACCESS_TOKEN_COOKIE)?;
        Some(CredentialPair {
            access_token,
            refresh_token: self.live_value(REFRESH_TOKEN_COOKIE),
        })
    }

    fn set(&self, pair: &CredentialPair) {
        match self.try_set(pair) {
            Ok(()) => {}
            Err(StoreError::Unavailable { .. }) => {
                tracing::debug!("Credential storage unavailable, dropping credentials");
            }
            Err(e) => tracing::warn!("Failed to persist credentials: {}", e),
        }
    }

    fn replace(&self, pair: &CredentialPair) {
        match self.try_replace(pair) {
            Ok(()) => {}
            Err(StoreError::Unavailable { .. }) => {
                tracing::debug!("Credential storage unavailable, dropping credentials");
            }
            Err(e) => tracing::warn!("Failed to persist credentials: {}", e),
        }
    }

    fn clear(&self) {
        match self.try_clear() {
            Ok(()) | Err(StoreError::Unavailable { .. }) => {}
            Err(e) => tracing::warn!("Failed to clear persisted credentials: {}", e),
        }
    }

    fn refresh_token(&self) -> Option<Secret> {
        self.live_value(REFRESH_TOKEN_COOKIE)
    }

    fn is_available(&self) -> bool {
        matches!(self.backing, Backing::File { .. })
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable {
        message: "no backing cookie jar".to_string(),
    }
}

/// Write the jar to a sibling temp file (mode 0600 on unix), then rename it
/// over `path`.
fn save(path: &Path, jar: &CookieJar) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(jar)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

//! Client configuration handling.
//!
//! Configuration is resolved in three layers:
//! 1. Built-in defaults
//! 2. `client.toml` in the platform config directory (if present)
//! 3. `ESTATE_ADMIN_*` environment variables

use chrono::Duration as ChronoDuration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "ESTATE_ADMIN_BASE_URL";

/// Environment variable overriding [`ClientConfig::timeout_secs`].
pub const TIMEOUT_ENV: &str = "ESTATE_ADMIN_TIMEOUT_SECS";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Error loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every relative request path is resolved against.
    pub base_url: String,

    /// Timeout applied to requests that do not set their own.
    pub timeout_secs: u64,

    /// Path of the token refresh endpoint.
    pub refresh_path: String,

    /// Path of the login endpoint.
    pub login_path: String,

    /// Path of the logout endpoint.
    pub logout_path: String,

    /// Path returning the authenticated admin's profile.
    pub profile_path: String,

    /// Header carrying the admin identifier derived from the token subject.
    pub identity_header: String,

    /// Seconds before expiry at which an access token is already refreshed.
    pub expiry_leeway_secs: i64,

    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            refresh_path: "/auth/refresh".to_string(),
            login_path: "/auth/login".to_string(),
            logout_path: "/auth/logout".to_string(),
            profile_path: "/auth/me".to_string(),
            identity_header: "X-Admin-Id".to_string(),
            expiry_leeway_secs: 0,
            user_agent: concat!("estate-admin/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at the given backend, other fields defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Default location of `client.toml`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.config_dir().join("client.toml"))
    }

    /// Load `path`, or defaults when it is `None` or does not exist, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_path(path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a specific TOML file. Missing keys take their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `ESTATE_ADMIN_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            tracing::debug!("Using base URL from {}", BASE_URL_ENV);
            self.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var(TIMEOUT_ENV) {
            self.timeout_secs = timeout.parse().map_err(|e| ConfigError::InvalidValue {
                key: TIMEOUT_ENV.to_string(),
                message: format!("{}", e),
            })?;
        }

        self.validate()
    }

    /// Check that the base URL parses and the timeout is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base()?;

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// The parsed base URL.
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "base_url".to_string(),
            message: format!("{}", e),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn expiry_leeway(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.expiry_leeway_secs)
    }
}

/// Platform directories for estate-admin.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "estate-admin", "estate-admin")
}

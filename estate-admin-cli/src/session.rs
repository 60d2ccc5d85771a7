//! Client construction for CLI commands.
//!
//! Resolves configuration and the cookie jar location, then builds an
//! [`ApiClient`] whose credentials persist between invocations.

use anyhow::{Context as _, Result};
use estate_admin_client::{ApiClient, AuthEvent, ClientConfig};
use estate_admin_core::{CookieStore, CredentialStore, create_store};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Everything a command needs.
pub struct Context {
    pub client: ApiClient,
    pub jar_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    events: broadcast::Receiver<AuthEvent>,
}

impl Context {
    /// Report a forced logout that happened during this invocation, if any.
    pub fn session_ended(&mut self) -> Option<AuthEvent> {
        self.events.try_recv().ok()
    }
}

/// Options shared by every command.
#[derive(Debug, Default, Clone)]
pub struct Options {
    pub base_url: Option<String>,
    pub jar: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub fn load_config(options: &Options) -> Result<(ClientConfig, Option<PathBuf>)> {
    let config_path = options.config.clone().or_else(ClientConfig::default_path);

    let mut config = ClientConfig::load(config_path.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if let Some(base_url) = &options.base_url {
        config.base_url = base_url.clone();
        config.validate().context("Invalid --base-url")?;
    }

    Ok((config, config_path))
}

pub fn connect(options: &Options) -> Result<Context> {
    let (config, config_path) = load_config(options)?;

    let jar_path = options.jar.clone().or_else(CookieStore::default_path);
    debug!("Cookie jar: {:?}", jar_path);
    let store: Arc<dyn CredentialStore> = Arc::from(create_store(jar_path.clone()));

    let client = ApiClient::builder(config)
        .store(store)
        .build()
        .context("Failed to build API client")?;
    let events = client.subscribe();

    Ok(Context {
        client,
        jar_path,
        config_path,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use estate_admin_core::CredentialPair;
    use tempfile::TempDir;

    #[test]
    fn test_base_url_flag_overrides_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("client.toml");
        std::fs::write(&config_path, "base_url = \"https://file.example.com/api\"\n").unwrap();

        let options = Options {
            base_url: Some("https://flag.example.com/api".to_string()),
            jar: None,
            config: Some(config_path.clone()),
        };
        let (config, path) = load_config(&options).unwrap();

        assert_eq!(path, Some(config_path));
        assert_eq!(config.base_url, "https://flag.example.com/api");
    }

    #[test]
    fn test_invalid_base_url_flag() {
        let options = Options {
            base_url: Some("nope".to_string()),
            ..Options::default()
        };
        assert!(load_config(&options).is_err());
    }

    #[test]
    fn test_connect_uses_given_jar() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("cookies.json");
        let options = Options {
            base_url: Some("http://localhost:3000/api".to_string()),
            jar: Some(jar.clone()),
            config: Some(dir.path().join("missing.toml")),
        };

        let context = connect(&options).unwrap();
        context.client.store().set(&CredentialPair::new("token"));

        assert!(jar.exists());
        assert_eq!(context.jar_path, Some(jar));
    }
}

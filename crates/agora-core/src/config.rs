//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API root, where tokens are kept, how concurrent token refreshes are
//! handled, the request timeout and the last email used to log in.
//!
//! Configuration is stored at `~/.config/agora/config.json`. The API root can
//! be overridden with the `AGORA_API_URL` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ForumClient, HttpTransport, RefreshPolicy, SessionController, DEFAULT_API_URL, REQUEST_TIMEOUT_SECS};
use crate::auth::tokens::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "agora";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API root
pub const API_URL_ENV: &str = "AGORA_API_URL";

/// Where access and refresh tokens are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub token_backend: TokenBackend,
    pub refresh_policy: RefreshPolicy,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            token_backend: TokenBackend::default(),
            refresh_policy: RefreshPolicy::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

/// Forum client as configured for this machine
pub type ConfiguredClient = ForumClient<HttpTransport, Box<dyn TokenStore>>;

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// API root: environment first, then the config file, then the default
    pub fn api_url(&self) -> String {
        self.resolve_api_url(std::env::var(API_URL_ENV).ok())
    }

    fn resolve_api_url(&self, from_env: Option<String>) -> String {
        from_env
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_store(&self) -> Result<Box<dyn TokenStore>> {
        match self.token_backend {
            TokenBackend::File => {
                let store = FileTokenStore::open(&self.cache_dir()?)
                    .context("Failed to open token file")?;
                Ok(Box::new(store))
            }
            TokenBackend::Keyring => {
                let store = KeyringTokenStore::new(APP_NAME).context("Failed to open keychain")?;
                Ok(Box::new(store))
            }
        }
    }

    /// Build a client wired to the configured API, token store and policy
    pub fn client(&self) -> Result<ConfiguredClient> {
        let api_url = self.api_url();
        debug!(api_url = %api_url, backend = ?self.token_backend, policy = ?self.refresh_policy, "Building client");

        let transport = HttpTransport::new(api_url, self.request_timeout())
            .context("Failed to build HTTP client")?;
        let session = SessionController::new(transport, self.token_store()?)
            .with_policy(self.refresh_policy);
        Ok(ForumClient::new(session))
    }
}

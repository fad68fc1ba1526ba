//! Client configuration management.
//!
//! `ClientConfig` holds everything a caller can tune: endpoints, timeouts,
//! where the session cache lives and whether it is reused, push-token
//! registration, and the retry budget.
//!
//! Configuration is stored at `~/.config/ringcam/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::retry::Backoff;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "ringcam";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session cache file name in the cache directory
const CACHE_FILE: &str = "session.json";

/// Main API origin.
pub const DEFAULT_API_BASE_URL: &str = "https://api.ring.com";

/// OAuth token endpoint.
pub const DEFAULT_OAUTH_URL: &str = "https://oauth.ring.com/oauth/token";

/// Per-request timeout in seconds.
/// The API answers quickly; anything slower is treated as a hung connection.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Request attempts for authentication and queries.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Initial backoff between authentication attempts.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 1000;

/// Upper bound for a single backoff wait.
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 8000;

/// Hardware identifier presented to the new-session endpoint.
const DEFAULT_HARDWARE_ID: &str = "180940d0-7285-3366-8c64-6ea91491982c";

/// Callback URL registered as the push-notification token.
const DEFAULT_PUSH_TOKEN_NOTIFY_URL: &str = "http://localhost/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub oauth_url: String,
    /// Default per-request timeout in seconds.
    pub timeout: u64,
    /// Session cache location. `None` resolves to the platform cache dir.
    pub cache_file: Option<PathBuf>,
    pub reuse_session: bool,
    pub persist_token: bool,
    pub push_token_notify_url: Option<String>,
    pub attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub hardware_id: String,
    /// Keep per-call extra query parameters for later calls until the next
    /// re-authentication.
    pub sticky_extra_params: bool,
    pub last_username: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            cache_file: None,
            reuse_session: true,
            persist_token: false,
            push_token_notify_url: Some(DEFAULT_PUSH_TOKEN_NOTIFY_URL.to_string()),
            attempts: DEFAULT_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            retry_max_backoff_ms: DEFAULT_RETRY_MAX_BACKOFF_MS,
            hardware_id: DEFAULT_HARDWARE_ID.to_string(),
            sticky_extra_params: false,
            last_username: None,
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
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

    /// Resolve the session cache path, defaulting to the platform cache dir.
    pub fn cache_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.cache_file {
            return Ok(path.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(CACHE_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }

    /// Join an endpoint path onto the API origin.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), endpoint)
    }

    // ===== Builders =====

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    #[must_use]
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_reuse_session(mut self, reuse: bool) -> Self {
        self.reuse_session = reuse;
        self
    }

    /// Register a push-notification token after each authentication.
    #[must_use]
    pub fn with_persist_token(mut self, persist: bool, notify_url: Option<String>) -> Self {
        self.persist_token = persist;
        if notify_url.is_some() {
            self.push_token_notify_url = notify_url;
        }
        self
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        self.retry_max_backoff_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_sticky_extra_params(mut self, sticky: bool) -> Self {
        self.sticky_extra_params = sticky;
        self
    }
}

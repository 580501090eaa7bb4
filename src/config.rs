//! Application configuration
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. `~/.config/fermentum-notify/config.json`
//! 3. Environment: `FERMENTUM_API_URL`, `FERMENTUM_API_TOKEN`, `FERMENTUM_TENANT_ID`
//! 4. CLI flags (applied by the binary)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::webhook::NormalizerConfig;

pub const ENV_API_URL: &str = "FERMENTUM_API_URL";
pub const ENV_API_TOKEN: &str = "FERMENTUM_API_TOKEN";
pub const ENV_TENANT_ID: &str = "FERMENTUM_TENANT_ID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// REST backend root, e.g. `http://localhost:5000/api`
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Sent as `X-Tenant-Id`, also stamped on events without a tenant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub request_timeout_secs: u64,
    pub sync_poll_interval_ms: u64,
    pub sync_history_limit: usize,
    pub toast_duration_ms: u64,
    pub webhook: NormalizerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            api_token: None,
            tenant_id: None,
            request_timeout_secs: 30,
            sync_poll_interval_ms: 2000,
            sync_history_limit: 5,
            toast_duration_ms: 3000,
            webhook: NormalizerConfig::default(),
        }
    }
}

impl AppConfig {
    /// `~/.config/fermentum-notify/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/fermentum-notify/config.json"))
    }

    /// Config file (if present) plus environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields defaults; an unreadable or invalid one is an error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let invalid = |reason: String| ConfigError::InvalidFile {
            path: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let config: AppConfig = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Empty values are ignored
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(token) = get(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(tenant) = get(ENV_TENANT_ID) {
            self.tenant_id = Some(tenant);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "apiBaseUrl",
                reason: format!("'{}' is not an http(s) URL", self.api_base_url),
            });
        }
        let positive = [
            ("requestTimeoutSecs", self.request_timeout_secs),
            ("syncPollIntervalMs", self.sync_poll_interval_ms),
            ("syncHistoryLimit", self.sync_history_limit as u64),
        ];
        if let Some((key, _)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue {
                key,
                reason: "must be greater than zero".to_string(),
            });
        }
        self.webhook.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

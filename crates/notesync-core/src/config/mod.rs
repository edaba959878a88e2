//! Client configuration.
//!
//! A single JSON file under the platform config directory, overridable from
//! the environment. Every value has a default except the remote API base URL,
//! which is only required once something actually talks to the server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option, parse_duration_secs};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR_NAME: &str = "notesync";

pub const ENV_API_URL: &str = "NOTESYNC_API_URL";
pub const ENV_DB_PATH: &str = "NOTESYNC_DB_PATH";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "NOTESYNC_REQUEST_TIMEOUT_SECS";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;
const DEFAULT_RETRY_BASE_DELAY_SECS: u64 = 2;
const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the remote note service, e.g. `https://notes.example.com`
    pub api_base_url: Option<String>,
    /// Offline queue database file
    pub db_path: Option<PathBuf>,
    /// Upper bound for every remote call
    pub request_timeout_secs: u64,
    /// How often the connectivity probe pings the service
    pub probe_interval_secs: u64,
    /// First retry delay after a failed sweep
    pub retry_base_delay_secs: u64,
    /// Retry delay ceiling
    pub retry_max_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            db_path: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            retry_base_delay_secs: DEFAULT_RETRY_BASE_DELAY_SECS,
            retry_max_delay_secs: DEFAULT_RETRY_MAX_DELAY_SECS,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::Config("failed to resolve config directory".into()))
}

pub fn default_db_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("offline.db"))
        .ok_or_else(|| Error::Config("failed to resolve data directory".into()))
}

impl ClientConfig {
    /// Load from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&default_config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT_SECS)
            .as_deref()
            .and_then(parse_duration_secs)
        {
            self.request_timeout_secs = timeout.as_secs();
        }
        self.normalize();
    }

    /// The validated API base URL, without a trailing slash.
    pub fn api_base_url(&self) -> Result<String> {
        let url = normalize_text_option(self.api_base_url.clone()).ok_or_else(|| {
            Error::Config(format!(
                "remote API URL is not configured (set {ENV_API_URL} or api_base_url)"
            ))
        })?;
        normalize_base_url(&url)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        self.db_path.clone().map_or_else(default_db_path, Ok)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs.max(1))
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs.max(self.retry_base_delay_secs).max(1))
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
    }
}

/// Require an http(s) scheme and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(Error::Config("API URL must not be empty".into()));
    }
    if !is_http_url(url) {
        return Err(Error::Config(
            "API URL must include http:// or https://".into(),
        ));
    }
    Ok(url.trim_end_matches('/').to_string())
}

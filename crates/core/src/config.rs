// crates/core/src/config.rs
//! Runtime configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! `SCANWATCH_*` environment variables. The binary layers CLI flags on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Backend the dashboard talks to (the original Flask app listens on 9001).
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:9001";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_PORT: u16 = 47900;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub tracker: TrackerConfig,
    pub notifier: NotifierConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Prepended to every backend path (`/api/scan`, `/api/job_status/..`).
    pub api_prefix: String,
    /// Upper bound for every backend request.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.into(),
            api_prefix: DEFAULT_API_PREFIX.into(),
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Polling and lifecycle timing for the job tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Delay between the end of one status check and the start of the next.
    pub poll_interval_ms: u64,
    /// How long a terminal state stays visible before the subject resets to idle.
    pub display_window_ms: u64,
    /// Consecutive transport failures tolerated before a job is failed.
    /// Zero means fail on the first one.
    pub max_transport_retries: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            display_window_ms: 10_000,
            max_transport_retries: 0,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn display_window(&self) -> Duration {
        Duration::from_millis(self.display_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Lifetime of terminal scan messages.
    pub message_ttl_ms: u64,
    /// Lifetime of terminal refresh messages.
    pub refresh_message_ttl_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            message_ttl_ms: 10_000,
            refresh_message_ttl_ms: 3_000,
        }
    }
}

impl NotifierConfig {
    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.message_ttl_ms)
    }

    pub fn refresh_message_ttl(&self) -> Duration {
        Duration::from_millis(self.refresh_message_ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file (if given), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Override fields from `SCANWATCH_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCANWATCH_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(prefix) = lookup("SCANWATCH_API_PREFIX") {
            self.backend.api_prefix = prefix;
        }
        if let Some(v) = lookup("SCANWATCH_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = parse_env("SCANWATCH_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("SCANWATCH_POLL_INTERVAL_MS") {
            self.tracker.poll_interval_ms = parse_env("SCANWATCH_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("SCANWATCH_DISPLAY_WINDOW_MS") {
            self.tracker.display_window_ms = parse_env("SCANWATCH_DISPLAY_WINDOW_MS", &v)?;
        }
        if let Some(v) = lookup("SCANWATCH_MAX_TRANSPORT_RETRIES") {
            self.tracker.max_transport_retries =
                parse_env("SCANWATCH_MAX_TRANSPORT_RETRIES", &v)?;
        }
        if let Some(v) = lookup("SCANWATCH_MESSAGE_TTL_MS") {
            self.notifier.message_ttl_ms = parse_env("SCANWATCH_MESSAGE_TTL_MS", &v)?;
        }
        if let Some(host) = lookup("SCANWATCH_HOST") {
            self.server.host = host;
        }
        if let Some(v) = lookup("SCANWATCH_PORT").or_else(|| lookup("PORT")) {
            self.server.port = parse_env("SCANWATCH_PORT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.backend.base_url)
            .map_err(|e| ConfigError::invalid("backend.base_url", e.to_string()))?;
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "backend.request_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.tracker.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "tracker.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("{raw:?}: {e}")))
}

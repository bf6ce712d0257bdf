//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Agent registry and HTTP client settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Per-request timeout applied to every agent HTTP call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Minutes after which an agent is considered due for a refresh.
    #[serde(default = "default_poll_minutes")]
    pub poll_minutes: u32,
    /// Hours without a submission before an agent is forgotten.
    #[serde(default = "default_unseen_forget_hours")]
    pub unseen_forget_hours: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            poll_minutes: default_poll_minutes(),
            unseen_forget_hours: default_unseen_forget_hours(),
        }
    }
}

impl AgentConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Seed workflow timing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SeedConfig {
    /// Pause between starting the receiver and starting the sender.
    #[serde(default = "default_listen_grace")]
    pub listen_grace_seconds: u64,
    /// Interval between progress polls of the target.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Consecutive unchanged polls tolerated before the copy is declared stalled.
    #[serde(default = "default_max_stale_polls")]
    pub max_stale_polls: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            listen_grace_seconds: default_listen_grace(),
            poll_interval_seconds: default_poll_interval(),
            max_stale_polls: default_max_stale_polls(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

fn default_poll_minutes() -> u32 {
    60
}

fn default_unseen_forget_hours() -> u32 {
    6
}

fn default_listen_grace() -> u64 {
    2
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_stale_polls() -> u32 {
    10
}

fn default_http_port() -> u16 {
    3000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path to the `SQLite` database file.
    pub db_path: PathBuf,
    /// Port for the HTTP API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Agent registry and client settings.
    #[serde(default)]
    pub agents: AgentConfig,
    /// Seed workflow timing.
    #[serde(default)]
    pub seed: SeedConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Database location as a string suitable for a `sqlite:` URL.
    #[must_use]
    pub fn db_path(&self) -> String {
        self.db_path.to_string_lossy().into_owned()
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config("db_path must not be empty".into()));
        }

        if self.seed.max_stale_polls == 0 {
            return Err(AppError::Config(
                "seed.max_stale_polls must be greater than zero".into(),
            ));
        }

        if self.seed.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "seed.poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.agents.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "agents.request_timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator timing configuration.
//!
//! Loaded from TOML (durations as strings such as `"5m"`), then overlaid
//! with environment overrides from [`crate::env`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleet_core::time_fmt::serde_duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("could not determine state directory (set FLEET_STATE_DIR)")]
    NoStateDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Period between heartbeat tag refreshes
    #[serde(with = "serde_duration")]
    pub heartbeat_interval: Duration,
    /// Heartbeat (or creation) age past which a builder is presumed dead
    #[serde(with = "serde_duration")]
    pub stale_after: Duration,
    /// Longest wait for another host's build before taking over
    #[serde(with = "serde_duration")]
    pub wait_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,
    #[serde(with = "serde_duration")]
    pub delete_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub tag_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(5 * 60),
            wait_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(30),
            delete_timeout: Duration::from_secs(10 * 60),
            tag_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl CoordinatorConfig {
    /// Load from the default location with environment overrides applied.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match env::config_path() {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(d) = env::heartbeat_stale() {
            self.stale_after = d;
        }
        if let Some(d) = env::wait_timeout() {
            self.wait_timeout = d;
        }
        if let Some(d) = env::poll_interval() {
            self.poll_interval = d;
        }
        self
    }

    /// The heartbeat must refresh strictly faster than it goes stale, or a
    /// live builder would be vacuumed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("intervals must be non-zero".to_string()));
        }
        if self.heartbeat_interval >= self.stale_after {
            return Err(ConfigError::Invalid(format!(
                "heartbeat_interval ({}) must be shorter than stale_after ({})",
                fleet_core::format_duration(self.heartbeat_interval),
                fleet_core::format_duration(self.stale_after),
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

/// Resolve state directory: FLEET_STATE_DIR > XDG_STATE_HOME/fleet > ~/.local/state/fleet
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("FLEET_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fleet"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoStateDir)?;
    Ok(home.join(".local/state/fleet"))
}

/// Session token directory under the state dir
pub fn session_dir() -> Result<PathBuf, ConfigError> {
    Ok(state_dir()?.join("template-sessions"))
}

/// Config file: FLEET_CONFIG > <config_dir>/fleet/config.toml
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("FLEET_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("fleet").join("config.toml"))
}

/// Heartbeat staleness threshold override
pub fn heartbeat_stale() -> Option<Duration> {
    secs("FLEET_HEARTBEAT_STALE_SECS")
}

/// Maximum wait for another builder override
pub fn wait_timeout() -> Option<Duration> {
    secs("FLEET_WAIT_TIMEOUT_SECS")
}

/// Wait-loop poll interval override
pub fn poll_interval() -> Option<Duration> {
    secs("FLEET_POLL_INTERVAL_SECS")
}

fn secs(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.trim().parse::<u64>().ok()).map(Duration::from_secs)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

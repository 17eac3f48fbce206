// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local persistence of per-version-key session tokens.
//!
//! Sessions live on the machine that started the build, never in the cloud:
//! a token survives a crash so the next run on this host can recognise and
//! reclaim its own abandoned builder, and is cleared once the build succeeds.

mod file;
#[cfg(any(test, feature = "test-support"))]
mod memory;

pub use file::FileSessionStore;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemorySessionStore;

use fleet_core::{SessionToken, VersionKey};
use thiserror::Error;

/// Errors from session store operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        SessionError::Io { path: path.display().to_string(), source }
    }
}

pub trait SessionStore: Send + Sync + 'static {
    /// Current token for `key`, if one was persisted.
    fn load(&self, key: &VersionKey) -> Result<Option<SessionToken>, SessionError>;

    fn save(&self, key: &VersionKey, token: &SessionToken) -> Result<(), SessionError>;

    /// Forget the token for `key`. Clearing an absent key is not an error.
    fn clear(&self, key: &VersionKey) -> Result<(), SessionError>;

    /// Keys with a persisted token, sorted.
    fn list(&self) -> Result<Vec<VersionKey>, SessionError>;

    /// Return the persisted token, or generate and persist a fresh one.
    fn load_or_create(&self, key: &VersionKey) -> Result<SessionToken, SessionError> {
        if let Some(token) = self.load(key)? {
            return Ok(token);
        }
        let token = SessionToken::generate();
        self.save(key, &token)?;
        tracing::debug!(key = %key, "created session token");
        Ok(token)
    }
}

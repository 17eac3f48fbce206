// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::{SessionToken, VersionKey};
use parking_lot::Mutex;

use super::{SessionError, SessionStore};

/// In-memory session store for tests
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<BTreeMap<VersionKey, SessionToken>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &VersionKey) -> Result<Option<SessionToken>, SessionError> {
        Ok(self.inner.lock().get(key).cloned())
    }

    fn save(&self, key: &VersionKey, token: &SessionToken) -> Result<(), SessionError> {
        self.inner.lock().insert(key.clone(), token.clone());
        Ok(())
    }

    fn clear(&self, key: &VersionKey) -> Result<(), SessionError> {
        self.inner.lock().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<VersionKey>, SessionError> {
        Ok(self.inner.lock().keys().cloned().collect())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version keys namespace coordination state for one singleton resource.
//!
//! A key is derived from the singleton's configuration (e.g. `agi-amd64-5`)
//! and doubles as a tag value and a local file name, so the character set is
//! restricted to what both accept.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionKeyError {
    #[error("version key is empty")]
    Empty,
    #[error("version key {0:?} is longer than 128 characters")]
    TooLong(String),
    #[error("version key {0:?} may only contain letters, digits, '.', '_' and '-'")]
    InvalidChar(String),
    #[error("version key {0:?} may not start with '.'")]
    LeadingDot(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionKey(String);

impl VersionKey {
    pub fn new(key: impl Into<String>) -> Result<Self, VersionKeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(VersionKeyError::Empty);
        }
        if key.len() > MAX_LEN {
            return Err(VersionKeyError::TooLong(key));
        }
        if key.starts_with('.') {
            return Err(VersionKeyError::LeadingDot(key));
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
            return Err(VersionKeyError::InvalidChar(key));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionKey {
    type Err = VersionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VersionKey {
    type Error = VersionKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<VersionKey> for String {
    fn from(k: VersionKey) -> Self {
        k.0
    }
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tag schema.
//!
//! Tags are the only shared durable storage the coordinator has. Every key it
//! reads or writes is declared here; keys it does not know are ignored.

use std::collections::BTreeMap;

/// Flat key/value annotations attached to a resource.
pub type Tags = BTreeMap<String, String>;

/// Resource role marker (`template-build`, `template`, `deployment`).
pub const TYPE: &str = "fleet.type";
/// Version key of the singleton a build instance or image belongs to.
pub const TEMPLATE_VERSION: &str = "fleet.tmpl.version";
/// Session token of the process building a singleton.
pub const SESSION: &str = "fleet.tmpl.session";
/// Unix seconds of the builder's last liveness refresh.
pub const HEARTBEAT: &str = "fleet.tmpl.heartbeat";
/// Owner label applied to everything the coordinator creates.
pub const OWNER: &str = "owner";

pub const TYPE_TEMPLATE_BUILD: &str = "template-build";
pub const TYPE_TEMPLATE: &str = "template";
pub const TYPE_DEPLOYMENT: &str = "deployment";

/// Build a tag map from string pairs.
pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Tags
where
    K: Into<String>,
    V: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Conjunctive tag match: a resource matches when every listed key is
/// present with the listed value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    required: Tags,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.required.iter().all(|(k, v)| tags.get(k) == Some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }
}

#[cfg(test)]
#[path = "tags_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud resource references.
//!
//! A [`ResourceRef`] is an opaque handle owned by the backend driver. The
//! coordinator never creates or destroys one directly; it only passes refs
//! back to the driver and reads or writes their tag sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tags::Tags;

/// Which provider a resource lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Aws,
    Gcp,
    Docker,
}

impl BackendType {
    /// Local container runtimes have no multi-host concurrency exposure:
    /// anything found there was started from this machine.
    pub fn is_local(self) -> bool {
        matches!(self, BackendType::Docker)
    }
}

crate::simple_display! {
    BackendType {
        Aws => "aws",
        Gcp => "gcp",
        Docker => "docker",
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(BackendType::Aws),
            "gcp" => Ok(BackendType::Gcp),
            "docker" => Ok(BackendType::Docker),
            other => Err(format!("unknown backend type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Instance,
    Volume,
    Image,
    Firewall,
    DnsRecord,
}

crate::simple_display! {
    ResourceKind {
        Instance => "instance",
        Volume => "volume",
        Image => "image",
        Firewall => "firewall",
        DnsRecord => "dns record",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Pending,
    Running,
    Stopped,
    Terminated,
}

crate::simple_display! {
    LifecycleState {
        Pending => "pending",
        Running => "running",
        Stopped => "stopped",
        Terminated => "terminated",
    }
}

/// Handle to a cloud object plus where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Provider-assigned identifier (instance id, volume id, image id)
    pub id: String,
    /// Human-facing name
    pub name: String,
    pub kind: ResourceKind,
    pub backend: BackendType,
    /// Zone or region, when the provider scopes the resource to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl ResourceRef {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ResourceKind,
        backend: BackendType,
    ) -> Self {
        Self { id: id.into(), name: name.into(), kind, backend, zone: None }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.id)
    }
}

/// A listed resource: its handle plus the observable metadata the
/// coordinator reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub reference: ResourceRef,
    #[serde(default)]
    pub tags: Tags,
    pub created_at_ms: u64,
    pub state: LifecycleState,
}

impl Resource {
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_terminated(&self) -> bool {
        self.state == LifecycleState::Terminated
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;

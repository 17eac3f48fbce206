// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend driver seam.
//!
//! One implementation per provider. Every call may fail, may be slow, and
//! offers no cross-host atomicity: two creates racing for the same name can
//! both succeed. The coordinator layers its own arbitration on top.

use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{BackendType, Resource, ResourceKind, ResourceRef, TagFilter, Tags};
use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackendCall, BackendOp, FakeBackend};

/// Errors from backend driver operations
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Provider(String),
    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: String, timeout: Duration },
}

impl BackendError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BackendError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }

    /// Lowercased message text, for callers that classify provider errors
    /// by content (capacity exhaustion, spot unavailability).
    pub fn message_lower(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }
}

/// What to launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub instance_type: String,
    /// Template image to boot from; `None` boots the base OS
    pub image: Option<String>,
    pub spot: bool,
    pub zone: Option<String>,
    pub firewalls: Vec<String>,
    pub tags: Tags,
    pub expire: Option<Duration>,
    pub terminate_on_poweroff: bool,
    pub arch: Option<String>,
    /// Extra published ports (local container runtimes only)
    pub ports: Vec<String>,
}

impl InstanceSpec {
    pub fn new(name: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self { name: name.into(), instance_type: instance_type.into(), ..Default::default() }
    }

    fleet_core::setters! {
        set {
            spot: bool,
            firewalls: Vec<String>,
            tags: Tags,
            terminate_on_poweroff: bool,
            ports: Vec<String>,
        }
        option {
            image: String,
            zone: String,
            expire: Duration,
            arch: String,
        }
    }
}

/// Persistent volume to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub zone: Option<String>,
    /// Size in GiB; `None` for elastic filesystems that grow on demand
    pub size_gib: Option<u32>,
    pub encrypted: bool,
    pub tags: Tags,
    pub expire: Option<Duration>,
}

impl VolumeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    fleet_core::setters! {
        set {
            encrypted: bool,
            tags: Tags,
        }
        option {
            zone: String,
            size_gib: u32,
            expire: Duration,
        }
    }
}

/// Image capture from a stopped instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub name: String,
    pub source: ResourceRef,
    pub tags: Tags,
    pub description: String,
}

impl ImageSpec {
    pub fn new(name: impl Into<String>, source: ResourceRef) -> Self {
        Self { name: name.into(), source, tags: Tags::new(), description: String::new() }
    }

    fleet_core::setters! {
        into { description: String }
        set { tags: Tags }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirewallSpec {
    pub name: String,
    pub ports: Vec<u16>,
    pub tags: Tags,
}

impl FirewallSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    fleet_core::setters! {
        set {
            ports: Vec<u16>,
            tags: Tags,
        }
    }
}

/// DNS record pointing a hostname at an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecordSpec {
    pub zone_id: String,
    pub hostname: String,
    pub target: ResourceRef,
}

/// How an attached volume should be mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub path: String,
    pub fips: bool,
}

impl MountSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), fips: false }
    }
}

/// Per-provider resource operations plus the per-resource tag store.
#[async_trait]
pub trait BackendDriver: Send + Sync + 'static {
    fn backend_type(&self) -> BackendType;

    /// List resources of a kind whose tags match the filter. Terminated
    /// instances may be included; callers filter by state.
    async fn list(&self, kind: ResourceKind, filter: &TagFilter)
        -> Result<Vec<Resource>, BackendError>;

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<Resource, BackendError>;
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<Resource, BackendError>;
    async fn create_image(&self, spec: &ImageSpec) -> Result<Resource, BackendError>;
    async fn create_firewall(&self, spec: &FirewallSpec) -> Result<Resource, BackendError>;
    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> Result<Resource, BackendError>;

    async fn attach_volume(
        &self,
        volume: &ResourceRef,
        instance: &ResourceRef,
        mount: &MountSpec,
    ) -> Result<(), BackendError>;

    async fn stop_instance(&self, target: &ResourceRef, timeout: Duration)
        -> Result<(), BackendError>;

    /// Delete (or terminate, for instances) a resource.
    async fn delete(&self, target: &ResourceRef, timeout: Duration) -> Result<(), BackendError>;

    /// Merge `tags` into the resource's tag set.
    async fn set_tags(&self, target: &ResourceRef, tags: &Tags) -> Result<(), BackendError>;
    async fn get_tags(&self, target: &ResourceRef) -> Result<Tags, BackendError>;

    /// Set or clear the expiry deadline (epoch milliseconds).
    async fn set_expiry(
        &self,
        target: &ResourceRef,
        expires_at_ms: Option<u64>,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

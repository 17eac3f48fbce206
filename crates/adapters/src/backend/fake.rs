// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory backend for tests

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{
    BackendType, Clock, FakeClock, LifecycleState, Resource, ResourceKind, ResourceRef, TagFilter,
    Tags,
};
use parking_lot::Mutex;

use super::{
    BackendDriver, BackendError, DnsRecordSpec, FirewallSpec, ImageSpec, InstanceSpec, MountSpec,
    VolumeSpec,
};

/// Operation selector for fault and delay injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    List,
    CreateInstance,
    CreateVolume,
    CreateImage,
    CreateFirewall,
    CreateDnsRecord,
    Attach,
    Stop,
    Delete,
    SetTags,
    GetTags,
    SetExpiry,
}

/// Recorded mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateInstance { name: String, spot: bool },
    CreateVolume { name: String },
    CreateImage { name: String, source: String },
    CreateFirewall { name: String },
    CreateDnsRecord { hostname: String },
    Attach { volume: String, instance: String, path: String },
    Stop { id: String },
    Delete { id: String, kind: ResourceKind },
    SetTags { id: String, tags: Tags },
    SetExpiry { id: String, expires_at_ms: Option<u64> },
}

struct FakeBackendState {
    resources: BTreeMap<String, Resource>,
    expiries: HashMap<String, Option<u64>>,
    next_id: u64,
    calls: Vec<BackendCall>,
    faults: HashMap<BackendOp, VecDeque<BackendError>>,
    delays: HashMap<BackendOp, Duration>,
}

/// Fake backend driver for testing.
///
/// Terminated instances stay listed (as cloud providers report them for a
/// while); every other kind is removed on delete.
#[derive(Clone)]
pub struct FakeBackend {
    backend: BackendType,
    clock: FakeClock,
    inner: Arc<Mutex<FakeBackendState>>,
}

impl FakeBackend {
    pub fn new(backend: BackendType) -> Self {
        Self::with_clock(backend, FakeClock::new())
    }

    pub fn with_clock(backend: BackendType, clock: FakeClock) -> Self {
        Self {
            backend,
            clock,
            inner: Arc::new(Mutex::new(FakeBackendState {
                resources: BTreeMap::new(),
                expiries: HashMap::new(),
                next_id: 1,
                calls: Vec::new(),
                faults: HashMap::new(),
                delays: HashMap::new(),
            })),
        }
    }

    pub fn clock(&self) -> &FakeClock {
        &self.clock
    }

    /// Fail the next call to `op` with `error`. Queued faults fire in order.
    pub fn fail_next(&self, op: BackendOp, error: BackendError) {
        self.inner.lock().faults.entry(op).or_default().push_back(error);
    }

    /// Sleep (on the tokio clock) before completing every call to `op`.
    pub fn delay(&self, op: BackendOp, by: Duration) {
        self.inner.lock().delays.insert(op, by);
    }

    /// Seed a resource as if another host had created it.
    pub fn insert(&self, resource: Resource) {
        self.inner.lock().resources.insert(resource.id().to_string(), resource);
    }

    /// Build and seed a resource with the given tags and creation time.
    pub fn seed(
        &self,
        kind: ResourceKind,
        name: &str,
        tags: Tags,
        created_at_ms: u64,
    ) -> ResourceRef {
        let id = self.next_id(kind);
        let state = match kind {
            ResourceKind::Instance => LifecycleState::Running,
            _ => LifecycleState::Pending,
        };
        let reference = ResourceRef::new(id, name, kind, self.backend);
        self.insert(Resource { reference: reference.clone(), tags, created_at_ms, state });
        reference
    }

    pub fn get(&self, id: &str) -> Option<Resource> {
        self.inner.lock().resources.get(id).cloned()
    }

    pub fn find(&self, kind: ResourceKind, name: &str) -> Option<Resource> {
        self.inner
            .lock()
            .resources
            .values()
            .find(|r| r.reference.kind == kind && r.name() == name && !r.is_terminated())
            .cloned()
    }

    /// Live (non-terminated) resources of a kind
    pub fn live(&self, kind: ResourceKind) -> Vec<Resource> {
        self.inner
            .lock()
            .resources
            .values()
            .filter(|r| r.reference.kind == kind && !r.is_terminated())
            .cloned()
            .collect()
    }

    pub fn expiry(&self, id: &str) -> Option<Option<u64>> {
        self.inner.lock().expiries.get(id).copied()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Ids passed to `delete`, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Delete { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    fn next_id(&self, kind: ResourceKind) -> String {
        let mut state = self.inner.lock();
        let n = state.next_id;
        state.next_id += 1;
        let prefix = match kind {
            ResourceKind::Instance => "i",
            ResourceKind::Volume => "vol",
            ResourceKind::Image => "img",
            ResourceKind::Firewall => "sg",
            ResourceKind::DnsRecord => "dns",
        };
        format!("{prefix}-{n:04}")
    }

    /// Apply injected delay, then pop an injected fault if one is queued.
    /// Callers record the call first, so failed attempts appear in `calls()`.
    async fn enter(&self, op: BackendOp) -> Result<(), BackendError> {
        let delay = self.inner.lock().delays.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.inner.lock().faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&self, call: BackendCall) {
        self.inner.lock().calls.push(call);
    }

    fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        tags: Tags,
        state: LifecycleState,
        zone: Option<&String>,
    ) -> Result<Resource, BackendError> {
        if self.find(kind, name).is_some() {
            return Err(BackendError::AlreadyExists { kind, name: name.to_string() });
        }
        let mut reference = ResourceRef::new(self.next_id(kind), name, kind, self.backend);
        reference.zone = zone.cloned();
        let resource =
            Resource { reference, tags, created_at_ms: self.clock.epoch_ms(), state };
        self.insert(resource.clone());
        Ok(resource)
    }

    fn require(&self, target: &ResourceRef) -> Result<(), BackendError> {
        match self.get(&target.id) {
            Some(r) if !r.is_terminated() => Ok(()),
            _ => Err(BackendError::NotFound(target.to_string())),
        }
    }
}

#[async_trait]
impl BackendDriver for FakeBackend {
    fn backend_type(&self) -> BackendType {
        self.backend
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &TagFilter,
    ) -> Result<Vec<Resource>, BackendError> {
        self.enter(BackendOp::List).await?;
        Ok(self
            .inner
            .lock()
            .resources
            .values()
            .filter(|r| r.reference.kind == kind && filter.matches(&r.tags))
            .cloned()
            .collect())
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<Resource, BackendError> {
        self.record(BackendCall::CreateInstance { name: spec.name.clone(), spot: spec.spot });
        self.enter(BackendOp::CreateInstance).await?;
        self.create(
            ResourceKind::Instance,
            &spec.name,
            spec.tags.clone(),
            LifecycleState::Running,
            spec.zone.as_ref(),
        )
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<Resource, BackendError> {
        self.record(BackendCall::CreateVolume { name: spec.name.clone() });
        self.enter(BackendOp::CreateVolume).await?;
        self.create(
            ResourceKind::Volume,
            &spec.name,
            spec.tags.clone(),
            LifecycleState::Pending,
            spec.zone.as_ref(),
        )
    }

    async fn create_image(&self, spec: &ImageSpec) -> Result<Resource, BackendError> {
        self.record(BackendCall::CreateImage {
            name: spec.name.clone(),
            source: spec.source.id.clone(),
        });
        self.enter(BackendOp::CreateImage).await?;
        self.require(&spec.source)?;
        self.create(
            ResourceKind::Image,
            &spec.name,
            spec.tags.clone(),
            LifecycleState::Pending,
            None,
        )
    }

    async fn create_firewall(&self, spec: &FirewallSpec) -> Result<Resource, BackendError> {
        self.record(BackendCall::CreateFirewall { name: spec.name.clone() });
        self.enter(BackendOp::CreateFirewall).await?;
        self.create(
            ResourceKind::Firewall,
            &spec.name,
            spec.tags.clone(),
            LifecycleState::Pending,
            None,
        )
    }

    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> Result<Resource, BackendError> {
        self.record(BackendCall::CreateDnsRecord { hostname: spec.hostname.clone() });
        self.enter(BackendOp::CreateDnsRecord).await?;
        self.require(&spec.target)?;
        self.create(
            ResourceKind::DnsRecord,
            &spec.hostname,
            Tags::new(),
            LifecycleState::Pending,
            None,
        )
    }

    async fn attach_volume(
        &self,
        volume: &ResourceRef,
        instance: &ResourceRef,
        mount: &MountSpec,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Attach {
            volume: volume.id.clone(),
            instance: instance.id.clone(),
            path: mount.path.clone(),
        });
        self.enter(BackendOp::Attach).await?;
        self.require(volume)?;
        self.require(instance)
    }

    async fn stop_instance(
        &self,
        target: &ResourceRef,
        _timeout: Duration,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Stop { id: target.id.clone() });
        self.enter(BackendOp::Stop).await?;
        self.require(target)?;
        if let Some(r) = self.inner.lock().resources.get_mut(&target.id) {
            r.state = LifecycleState::Stopped;
        }
        Ok(())
    }

    async fn delete(&self, target: &ResourceRef, _timeout: Duration) -> Result<(), BackendError> {
        self.record(BackendCall::Delete { id: target.id.clone(), kind: target.kind });
        self.enter(BackendOp::Delete).await?;
        self.require(target)?;
        let mut state = self.inner.lock();
        if target.kind == ResourceKind::Instance {
            if let Some(r) = state.resources.get_mut(&target.id) {
                r.state = LifecycleState::Terminated;
            }
        } else {
            state.resources.remove(&target.id);
        }
        Ok(())
    }

    async fn set_tags(&self, target: &ResourceRef, tags: &Tags) -> Result<(), BackendError> {
        self.record(BackendCall::SetTags { id: target.id.clone(), tags: tags.clone() });
        self.enter(BackendOp::SetTags).await?;
        self.require(target)?;
        if let Some(r) = self.inner.lock().resources.get_mut(&target.id) {
            r.tags.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }

    async fn get_tags(&self, target: &ResourceRef) -> Result<Tags, BackendError> {
        self.enter(BackendOp::GetTags).await?;
        self.get(&target.id)
            .map(|r| r.tags)
            .ok_or_else(|| BackendError::NotFound(target.to_string()))
    }

    async fn set_expiry(
        &self,
        target: &ResourceRef,
        expires_at_ms: Option<u64>,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::SetExpiry { id: target.id.clone(), expires_at_ms });
        self.enter(BackendOp::SetExpiry).await?;
        self.require(target)?;
        self.inner.lock().expiries.insert(target.id.clone(), expires_at_ms);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

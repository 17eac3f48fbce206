// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::snapshot::{keys, Arch};
use fleet_adapters::{
    BackendCall, BackendError, BackendOp, ExecOutput, FakeBackend, FakeRemote,
    MemorySessionStore, RemoteError,
};
use fleet_core::{BackendType, FakeClock, Tags, VersionKey};

const FREE_16G: &str = "               total        used        free
Mem:     17179869184   812453888 16367415296
Swap:              0           0           0
";
const TEMPLATE: &str = "fleet-tmpl-agi7";

struct Harness {
    backend: FakeBackend,
    remote: FakeRemote,
    clock: FakeClock,
    interrupt: CancellationToken,
    renders: Arc<CountingRenderer>,
}

impl Harness {
    fn new(backend: BackendType) -> Self {
        let clock = FakeClock::new();
        let h = Self {
            backend: FakeBackend::with_clock(backend, clock.clone()),
            remote: FakeRemote::new(),
            clock,
            interrupt: CancellationToken::new(),
            renders: Arc::new(CountingRenderer::default()),
        };
        h.remote.on("free -b", Ok(ExecOutput::from_stdout(FREE_16G)));
        h.backend.seed(
            ResourceKind::Image,
            TEMPLATE,
            tags::from_pairs([(tags::TYPE, tags::TYPE_TEMPLATE), (tags::TEMPLATE_VERSION, "agi-amd64-7")]),
            0,
        );
        h
    }

    fn deployer(&self) -> Deployer<FakeClock> {
        Deployer::new(
            Arc::new(self.backend.clone()),
            Arc::new(self.remote.clone()),
            Arc::new(MemorySessionStore::new()),
            self.clock.clone(),
            CoordinatorConfig::default(),
            self.interrupt.clone(),
        )
        .renderer(Arc::clone(&self.renders) as Arc<dyn ConfigRenderer>)
        .retries(RetryPolicy::once(), RetryPolicy::once())
    }

    fn seed_volume(&self, snapshot_of: &DeploymentParams) -> ResourceRef {
        let mut all = snapshot(snapshot_of);
        all.insert(tags::TYPE.to_string(), tags::TYPE_DEPLOYMENT.to_string());
        self.backend.seed(ResourceKind::Volume, &snapshot_of.name, all, 0)
    }

    fn volume_tags(&self) -> Tags {
        self.backend.find(ResourceKind::Volume, "agi").map(|v| v.tags).unwrap_or_default()
    }

    fn spot_requests(&self) -> Vec<bool> {
        self.backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::CreateInstance { spot, .. } => Some(spot),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct CountingRenderer {
    calls: AtomicUsize,
}

impl ConfigRenderer for CountingRenderer {
    fn render(&self, params: &DeploymentParams, usable_memory: u64) -> Result<Vec<UploadFile>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = format!("heap = {}\nsftp_password = {:?}\n", usable_memory / GIB, params.secrets.sftp_password);
        Ok(vec![UploadFile::new("/opt/agi/agi.toml", body).mode(0o600)])
    }
}

fn template() -> TemplateSpec {
    TemplateSpec::new(VersionKey::new("agi-amd64-7").unwrap(), "#!/bin/bash\n")
}

fn params() -> DeploymentParams {
    DeploymentParams {
        owner: "ops".into(),
        firewall: "fleet-agi".into(),
        ..DeploymentParams::new("agi", "")
    }
}

fn request(params: DeploymentParams) -> DeploymentRequest {
    DeploymentRequest::new(params, template())
}

#[tokio::test]
async fn fresh_deployment_end_to_end() {
    let h = Harness::new(BackendType::Aws);
    let mut p = params();
    p.secrets.sftp_password = "hunter2".into();
    let result = h.deployer().deploy(request(p)).await.unwrap();

    assert_eq!(result.template, TEMPLATE);
    assert!(result.volume_created);
    assert_eq!(result.usable_memory, 10 * GIB);
    assert!(result.dns.is_none());
    assert!(result.service_error.is_none());
    assert_eq!(result.params.instance_type, "r7i.xlarge");
    assert!(result.params.secrets.sftp_password.is_empty());

    let (config, _) = h.remote.file(&result.instance, "/opt/agi/agi.toml").unwrap();
    assert!(String::from_utf8(config).unwrap().contains("hunter2"));

    let stored = h.volume_tags();
    assert_eq!(stored.get(keys::TEMPLATE).map(String::as_str), Some(TEMPLATE));
    assert_eq!(stored.get(keys::INSTANCE_TYPE).map(String::as_str), Some("r7i.xlarge"));
    assert_eq!(stored.get(tags::OWNER).map(String::as_str), Some("ops"));
    assert!(stored.values().all(|v| !v.contains("hunter2")));

    let instance = h.backend.get(&result.instance.id).unwrap();
    assert_eq!(instance.tag(tags::TYPE), Some(tags::TYPE_DEPLOYMENT));
    assert!(h.backend.find(ResourceKind::Firewall, "fleet-agi").is_some());
    assert!(h.backend.deleted().is_empty());
}

#[tokio::test]
async fn attach_failure_unwinds_instance_then_volume() {
    let h = Harness::new(BackendType::Aws);
    h.backend.fail_next(BackendOp::Attach, BackendError::Provider("VolumeInUse".to_string()));

    let err = h.deployer().deploy(request(params())).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("attach volume"));

    let instance = h.backend.find(ResourceKind::Instance, "agi");
    assert!(instance.is_none());
    assert!(h.backend.live(ResourceKind::Volume).is_empty());
    let deleted = h.backend.deleted();
    assert_eq!(deleted.len(), 2);
    assert!(deleted[0].starts_with("i-") && deleted[1].starts_with("vol-"));
    // Shared resources stay
    assert!(h.backend.find(ResourceKind::Firewall, "fleet-agi").is_some());
    assert!(h.backend.find(ResourceKind::Image, TEMPLATE).is_some());
}

#[tokio::test]
async fn reused_volume_survives_failure() {
    let h = Harness::new(BackendType::Aws);
    let volume = h.seed_volume(&DeploymentParams { template: TEMPLATE.into(), ..params() });
    h.backend.fail_next(BackendOp::Attach, BackendError::Provider("VolumeInUse".to_string()));

    let err = h.deployer().deploy(request(params()).force(true)).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("attach volume"));
    assert!(h.backend.get(&volume.id).is_some());
    assert_eq!(h.backend.deleted().len(), 1);
}

#[tokio::test]
async fn existing_volume_needs_force() {
    let h = Harness::new(BackendType::Aws);
    h.seed_volume(&params());

    let err = h.deployer().deploy(request(params())).await.unwrap_err();
    assert!(matches!(err, EngineError::VolumeExists(ref name) if name == "agi"));
    assert!(h.spot_requests().is_empty());
}

#[tokio::test]
async fn spot_fallback_is_recorded_in_snapshot() {
    let h = Harness::new(BackendType::Aws);
    h.backend.fail_next(
        BackendOp::CreateInstance,
        BackendError::Provider("InsufficientInstanceCapacity".to_string()),
    );
    let p = DeploymentParams { spot: true, spot_fallback: true, ..params() };

    let result = h.deployer().deploy(request(p)).await.unwrap();
    assert_eq!(h.spot_requests(), vec![true, false]);
    assert!(!result.params.spot);
    assert_eq!(h.volume_tags().get(keys::SPOT).map(String::as_str), Some("false"));
}

#[tokio::test]
async fn too_little_memory_unwinds() {
    let h = Harness::new(BackendType::Aws);
    h.remote.on("free -b", Ok(ExecOutput::from_stdout("total\nMem: 4294967296 0 0\n")));

    let err = h.deployer().deploy(request(params())).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("query instance memory"));
    assert!(err.to_string().contains("not enough memory"));
    assert_eq!(h.backend.deleted().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_attach_unwinds() {
    let h = Harness::new(BackendType::Aws);
    h.backend.delay(BackendOp::Attach, Duration::from_secs(600));
    let token = h.interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
    });

    let err = h.deployer().deploy(request(params())).await.unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(err.failed_step(), Some("attach volume"));
    assert!(h.backend.live(ResourceKind::Instance).is_empty());
    assert!(h.backend.live(ResourceKind::Volume).is_empty());
}

#[tokio::test]
async fn no_vacuum_leaves_resources() {
    let h = Harness::new(BackendType::Aws);
    h.backend.fail_next(BackendOp::Attach, BackendError::Provider("VolumeInUse".to_string()));

    let req = request(params()).no_vacuum(true);
    assert!(h.deployer().deploy(req).await.is_err());
    assert!(h.backend.deleted().is_empty());
    assert!(h.backend.find(ResourceKind::Instance, "agi").is_some());
}

#[tokio::test]
async fn reattach_rebuilds_from_volume_tags() {
    let h = Harness::new(BackendType::Aws);
    let recorded = DeploymentParams {
        instance_type: "r7g.2xlarge".into(),
        arch: Arch::Arm64,
        spot: true,
        label: "nightly".into(),
        template: TEMPLATE.into(),
        ..params()
    };
    let volume = h.seed_volume(&recorded);
    let overrides = Overrides { spot: Some(false), ..Overrides::default() };

    let result = h.deployer().reattach("agi", &overrides, template(), None).await.unwrap();
    assert!(!result.volume_created);
    assert_eq!(result.volume, volume);
    assert_eq!(result.template, TEMPLATE);
    assert_eq!(result.params.instance_type, "r7g.2xlarge");
    assert_eq!(result.params.label, "nightly");
    assert_eq!(h.spot_requests(), vec![false]);
    assert_eq!(h.renders.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.volume_tags().get(keys::SPOT).map(String::as_str), Some("false"));
}

#[tokio::test]
async fn reattach_without_volume_fails() {
    let h = Harness::new(BackendType::Aws);
    let err = h.deployer().reattach("agi", &Overrides::default(), template(), None).await.unwrap_err();
    assert!(matches!(err, EngineError::VolumeNotFound(ref name) if name == "agi"));
}

#[tokio::test]
async fn service_failure_keeps_deployment() {
    let h = Harness::new(BackendType::Aws);
    h.remote.on(
        "systemctl start agi",
        Err(RemoteError::CommandFailed {
            command: "systemctl start agi".into(),
            exit_code: 1,
            stderr: "unit failed".into(),
        }),
    );
    let req = request(params()).service_command("systemctl start agi");

    let result = h.deployer().deploy(req).await.unwrap();
    assert!(result.service_error.unwrap().contains("unit failed"));
    assert!(h.backend.deleted().is_empty());
}

#[tokio::test]
async fn dns_record_points_at_instance() {
    let h = Harness::new(BackendType::Aws);
    let p = DeploymentParams { dns_zone_id: "Z1".into(), dns_domain: "example.net.".into(), ..params() };

    let result = h.deployer().deploy(request(p)).await.unwrap();
    assert!(result.dns.is_some());
    assert!(h
        .backend
        .calls()
        .contains(&BackendCall::CreateDnsRecord { hostname: "agi.example.net".into() }));
}

#[tokio::test]
async fn dns_failure_only_warns() {
    let h = Harness::new(BackendType::Aws);
    h.backend.fail_next(BackendOp::CreateDnsRecord, BackendError::Provider("throttled".to_string()));
    let p = DeploymentParams { dns_zone_id: "Z1".into(), dns_domain: "example.net".into(), ..params() };

    let result = h.deployer().deploy(request(p)).await.unwrap();
    assert!(result.dns.is_none());
    assert!(h.backend.deleted().is_empty());
}

#[tokio::test]
async fn local_backend_skips_firewall() {
    let h = Harness::new(BackendType::Docker);
    let result = h.deployer().deploy(request(params())).await.unwrap();

    assert_eq!(result.params.instance_type, "container");
    assert_eq!(result.usable_memory, 13 * GIB);
    assert!(!h.backend.calls().iter().any(|c| matches!(c, BackendCall::CreateFirewall { .. })));
}

#[tokio::test]
async fn volume_expiry_follows_clock() {
    let h = Harness::new(BackendType::Aws);
    let volume = h.seed_volume(&params());
    let p = DeploymentParams { volume_expire: Duration::from_secs(3600), ..params() };

    h.deployer().deploy(request(p).force(true)).await.unwrap();
    assert_eq!(h.backend.expiry(&volume.id), Some(Some(h.clock.epoch_ms() + 3_600_000)));
}

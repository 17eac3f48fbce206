// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume-backed deployments.
//!
//! A deployment is an instance booted from a shared template with a
//! persistent volume mounted over its data directory. The volume carries a
//! config snapshot in its tags, so [`Deployer::reattach`] can rebuild the
//! instance from the volume alone.
//!
//! Pipeline: template, firewall, volume, instance, memory check, DNS,
//! attach, configure. Any failure unwinds what this run created; a reused
//! volume is never deleted. Service start runs after commit and only
//! reports failure.

mod memory;
mod steps;

pub use memory::{reservation, GIB};

use std::sync::Arc;
use std::time::Duration;

use fleet_adapters::{
    shell, BackendDriver, DnsRecordSpec, FirewallSpec, InstanceSpec, MountSpec, RemoteExec,
    SessionStore, VolumeSpec,
};
use fleet_core::{tags, Clock, Resource, ResourceKind, ResourceRef, TagFilter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::CoordinatorConfig;
use crate::fanout::UploadFile;
use crate::retry::RetryPolicy;
use crate::saga::Saga;
use crate::snapshot::{reconstruct, snapshot, DeploymentParams, Overrides};
use crate::template::{TemplateBuilder, TemplateSpec};
use crate::EngineError;
use steps::{
    AttachVolume, Configure, CreateDns, CreateInstance, EnsureFirewall, EnsureTemplate,
    EnsureVolume, MeasureMemory,
};

const SERVICE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Renders the service configuration files for a deployment.
pub trait ConfigRenderer: Send + Sync {
    fn render(
        &self,
        params: &DeploymentParams,
        usable_memory: u64,
    ) -> Result<Vec<UploadFile>, EngineError>;
}

#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub params: DeploymentParams,
    /// Deploy onto an existing volume of the same name
    pub force: bool,
    pub template: TemplateSpec,
    /// Extra files uploaded alongside rendered configuration
    pub files: Vec<UploadFile>,
    pub service_command: Option<String>,
    pub parallel_threads: usize,
    pub mount_path: String,
    /// Render configuration; false when the volume already holds it
    pub regenerate_config: bool,
    pub firewall_ports: Vec<u16>,
    /// Leave resources in place when a step fails
    pub no_vacuum: bool,
}

impl DeploymentRequest {
    pub fn new(params: DeploymentParams, template: TemplateSpec) -> Self {
        Self {
            params,
            force: false,
            template,
            files: Vec::new(),
            service_command: None,
            parallel_threads: 4,
            mount_path: "/opt/agi".to_string(),
            regenerate_config: true,
            firewall_ports: vec![22, 80, 443],
            no_vacuum: false,
        }
    }

    fleet_core::setters! {
        into {
            mount_path: String,
        }
        set {
            force: bool,
            files: Vec<UploadFile>,
            parallel_threads: usize,
            regenerate_config: bool,
            firewall_ports: Vec<u16>,
            no_vacuum: bool,
        }
        option {
            service_command: String,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub instance: ResourceRef,
    pub volume: ResourceRef,
    pub volume_created: bool,
    pub template: String,
    pub dns: Option<ResourceRef>,
    pub usable_memory: u64,
    /// Set when services failed to start; the deployment itself stands
    pub service_error: Option<String>,
    /// Parameters as resolved and snapshotted
    pub params: DeploymentParams,
}

pub struct Deployer<C: Clock> {
    backend: Arc<dyn BackendDriver>,
    remote: Arc<dyn RemoteExec>,
    sessions: Arc<dyn SessionStore>,
    clock: C,
    config: CoordinatorConfig,
    interrupt: CancellationToken,
    renderer: Option<Arc<dyn ConfigRenderer>>,
    memory_policy: RetryPolicy,
    remote_policy: RetryPolicy,
}

impl<C: Clock> Deployer<C> {
    pub fn new(
        backend: Arc<dyn BackendDriver>,
        remote: Arc<dyn RemoteExec>,
        sessions: Arc<dyn SessionStore>,
        clock: C,
        config: CoordinatorConfig,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            backend,
            remote,
            sessions,
            clock,
            config,
            interrupt,
            renderer: None,
            memory_policy: RetryPolicy::MEMORY_CHECK,
            remote_policy: RetryPolicy::REMOTE_STEP,
        }
    }

    pub fn renderer(mut self, renderer: Arc<dyn ConfigRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Override the retry policies for the memory check and other remote steps.
    pub fn retries(mut self, memory: RetryPolicy, remote: RetryPolicy) -> Self {
        self.memory_policy = memory;
        self.remote_policy = remote;
        self
    }

    /// Create a deployment, or with `force`, redeploy onto its existing volume.
    pub async fn deploy(&self, req: DeploymentRequest) -> Result<DeploymentResult, EngineError> {
        let name = req.params.name.clone();
        let existing = self.find_volume(&name).await?;
        if existing.is_some() && !req.force {
            return Err(EngineError::VolumeExists(name));
        }

        let backend_type = self.backend.backend_type();
        // Secrets stay for rendering; the snapshot and document strip them
        let mut resolved = req.params.clone();
        if resolved.instance_type.is_empty() {
            resolved.instance_type = resolved.arch.default_instance_type(backend_type).to_string();
        }

        let mut saga = Saga::new(self.interrupt.clone()).no_vacuum(req.no_vacuum);
        info!(run = %saga.run_id(), deployment = %name, reuse = existing.is_some(), "deploying");

        let builder = TemplateBuilder::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.remote),
            Arc::clone(&self.sessions),
            self.clock.clone(),
            self.config.clone(),
            self.interrupt.clone(),
        )
        .no_vacuum(req.no_vacuum);
        resolved.template = saga
            .step(EnsureTemplate {
                backend: &*self.backend,
                builder: &builder,
                spec: &req.template,
                preferred: &req.params.template,
            })
            .await?;

        if !resolved.firewall.is_empty() && !backend_type.is_local() {
            let mut spec = FirewallSpec::new(&resolved.firewall).ports(req.firewall_ports.clone());
            if !resolved.owner.is_empty() {
                spec = spec.tags(tags::from_pairs([(tags::OWNER, resolved.owner.as_str())]));
            }
            saga.step(EnsureFirewall { backend: &*self.backend, spec }).await?;
        }

        let volume = saga
            .step(EnsureVolume {
                backend: &self.backend,
                existing,
                spec: self.volume_spec(&resolved),
                expires_at_ms: self.expiry(resolved.volume_expire),
                delete_timeout: self.config.delete_timeout,
            })
            .await?;

        let instance = saga
            .step(CreateInstance {
                backend: &self.backend,
                spec: self.instance_spec(&resolved),
                spot_fallback: resolved.spot && resolved.spot_fallback,
                delete_timeout: self.config.delete_timeout,
            })
            .await?;
        resolved.spot = instance.spot;
        let instance = instance.instance;

        let usable_memory = saga
            .step(MeasureMemory {
                remote: &*self.remote,
                instance: &instance,
                policy: self.memory_policy,
            })
            .await?;

        let dns = if resolved.has_dns() {
            let domain = resolved.dns_domain.trim_end_matches('.');
            let spec = DnsRecordSpec {
                zone_id: resolved.dns_zone_id.clone(),
                hostname: format!("{}.{domain}", resolved.name),
                target: instance.clone(),
            };
            saga.step(CreateDns {
                backend: &self.backend,
                spec,
                delete_timeout: self.config.delete_timeout,
            })
            .await?
        } else {
            None
        };

        let mut mount = MountSpec::new(&req.mount_path);
        mount.fips = resolved.fips;
        saga.step(AttachVolume {
            backend: &*self.backend,
            remote: &*self.remote,
            volume: &volume.volume,
            instance: &instance,
            mount,
            policy: self.remote_policy,
        })
        .await?;

        let renderer = if req.regenerate_config { self.renderer.as_deref() } else { None };
        saga.step(Configure {
            backend: &*self.backend,
            remote: &*self.remote,
            renderer,
            instance: &instance,
            volume: &volume.volume,
            params: &resolved,
            files: &req.files,
            usable_memory,
            mount_path: &req.mount_path,
            threads: req.parallel_threads,
            tag_timeout: self.config.tag_timeout,
        })
        .await?;

        saga.commit();
        info!(
            deployment = %name,
            instance = %instance,
            volume = %volume.volume,
            "deployment ready"
        );

        let service_error = match &req.service_command {
            Some(command) => self.start_services(&instance, command).await,
            None => None,
        };

        Ok(DeploymentResult {
            instance,
            volume: volume.volume,
            volume_created: volume.created,
            template: resolved.template.clone(),
            dns,
            usable_memory,
            service_error,
            params: resolved.without_secrets(),
        })
    }

    /// Recreate the instance for an existing volume from the volume's own
    /// snapshot tags. Configuration already on the volume is kept.
    pub async fn reattach(
        &self,
        volume_name: &str,
        overrides: &Overrides,
        template: TemplateSpec,
        service_command: Option<String>,
    ) -> Result<DeploymentResult, EngineError> {
        let volume = self
            .find_volume(volume_name)
            .await?
            .ok_or_else(|| EngineError::VolumeNotFound(volume_name.to_string()))?;
        let tags = self.backend.get_tags(&volume.reference).await?;
        let params = reconstruct(&tags, overrides)?;
        info!(
            volume = %volume.reference,
            instance_type = %params.instance_type,
            spot = params.spot,
            "reattaching from snapshot"
        );

        let mut req = DeploymentRequest::new(params, template).force(true).regenerate_config(false);
        req.service_command = service_command;
        self.deploy(req).await
    }

    async fn find_volume(&self, name: &str) -> Result<Option<Resource>, EngineError> {
        let volumes = self.backend.list(ResourceKind::Volume, &TagFilter::new()).await?;
        Ok(volumes.into_iter().find(|v| v.name() == name && !v.is_terminated()))
    }

    fn expiry(&self, lifetime: Duration) -> Option<u64> {
        if lifetime.is_zero() {
            return None;
        }
        Some(self.clock.epoch_ms() + lifetime.as_millis() as u64)
    }

    fn volume_spec(&self, params: &DeploymentParams) -> VolumeSpec {
        let mut initial = snapshot(params);
        initial.insert(tags::TYPE.to_string(), tags::TYPE_DEPLOYMENT.to_string());
        if !params.owner.is_empty() {
            initial.insert(tags::OWNER.to_string(), params.owner.clone());
        }
        let mut spec = VolumeSpec::new(&params.name).encrypted(true).tags(initial);
        spec.size_gib = params.volume_size_gib;
        if !params.placement.is_empty() {
            spec.zone = Some(params.placement.clone());
        }
        if !params.volume_expire.is_zero() {
            spec.expire = Some(params.volume_expire);
        }
        spec
    }

    fn instance_spec(&self, params: &DeploymentParams) -> InstanceSpec {
        let mut instance_tags = tags::from_pairs([(tags::TYPE, tags::TYPE_DEPLOYMENT)]);
        if !params.owner.is_empty() {
            instance_tags.insert(tags::OWNER.to_string(), params.owner.clone());
        }
        let mut spec = InstanceSpec::new(&params.name, &params.instance_type)
            .image(&params.template)
            .arch(params.arch.to_string())
            .spot(params.spot)
            .terminate_on_poweroff(params.terminate_on_poweroff)
            .tags(instance_tags);
        if !params.firewall.is_empty() {
            spec.firewalls = vec![params.firewall.clone()];
        }
        if !params.placement.is_empty() {
            spec.zone = Some(params.placement.clone());
        }
        if !params.expire.is_zero() {
            spec.expire = Some(params.expire);
        }
        spec
    }

    async fn start_services(&self, instance: &ResourceRef, command: &str) -> Option<String> {
        let argv = &shell(command);
        let remote = &*self.remote;
        let result = self
            .remote_policy
            .run("start services", move |_| async move {
                remote.exec(instance, argv, SERVICE_TIMEOUT).await
            })
            .await;
        match result {
            Ok(_) => {
                info!(instance = %instance, "services started");
                None
            }
            Err(e) => {
                error!(
                    instance = %instance,
                    error = %e,
                    "services failed to start; deployment kept for manual recovery"
                );
                Some(e.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

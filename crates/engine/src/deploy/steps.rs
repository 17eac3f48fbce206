// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment pipeline steps.
//!
//! Each step holds only its own inputs. Steps that create billable
//! resources are not interruptible and hand back a compensation for exactly
//! what they created.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_adapters::{
    shell, BackendDriver, BackendError, DnsRecordSpec, FirewallSpec, InstanceSpec, MountSpec,
    RemoteExec, VolumeSpec,
};
use fleet_core::{Clock, Resource, ResourceKind, ResourceRef, TagFilter};
use tracing::{debug, info, warn};

use super::memory;
use super::ConfigRenderer;
use crate::fanout::{upload_files, UploadFile};
use crate::retry::RetryPolicy;
use crate::saga::{DeleteResource, SagaStep, StepOutcome};
use crate::snapshot::{document_path, encode_document, tag_update, DeploymentParams};
use crate::template::{TemplateBuilder, TemplateSpec};
use crate::EngineError;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Provider error text that means "no spot capacity right now".
pub(crate) fn is_capacity_error(e: &BackendError) -> bool {
    let message = e.message_lower();
    ["capacity", "spot", "insufficient"].iter().any(|s| message.contains(s))
}

pub(super) struct EnsureTemplate<'a, C: Clock> {
    pub backend: &'a dyn BackendDriver,
    pub builder: &'a TemplateBuilder<C>,
    pub spec: &'a TemplateSpec,
    /// Template recorded by an earlier deployment, used while it still exists
    pub preferred: &'a str,
}

#[async_trait]
impl<C: Clock> SagaStep for EnsureTemplate<'_, C> {
    type Output = String;

    fn name(&self) -> &str {
        "ensure template"
    }

    // The builder runs its own saga and unwinds on interrupt.
    fn interruptible(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<StepOutcome<String>, EngineError> {
        if !self.preferred.is_empty() {
            let images = self.backend.list(ResourceKind::Image, &TagFilter::new()).await?;
            if images.iter().any(|i| i.name() == self.preferred && !i.is_terminated()) {
                info!(template = self.preferred, "using recorded template");
                return Ok(StepOutcome::done(self.preferred.to_string()));
            }
            warn!(template = self.preferred, "recorded template is gone, resolving by version");
        }
        let outcome = self.builder.ensure(self.spec).await?;
        Ok(StepOutcome::done(outcome.name().to_string()))
    }
}

pub(super) struct EnsureFirewall<'a> {
    pub backend: &'a dyn BackendDriver,
    pub spec: FirewallSpec,
}

#[async_trait]
impl SagaStep for EnsureFirewall<'_> {
    type Output = ();

    fn name(&self) -> &str {
        "ensure firewall"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        match self.backend.create_firewall(&self.spec).await {
            Ok(fw) => info!(firewall = %fw.reference, "firewall created"),
            Err(e) if e.is_already_exists() => {
                debug!(firewall = %self.spec.name, "firewall exists")
            }
            Err(e) => return Err(e.into()),
        }
        // Shared by every deployment; never removed on rollback
        Ok(StepOutcome::done(()))
    }
}

/// The volume to deploy onto and whether this run created it.
#[derive(Debug, Clone)]
pub(super) struct VolumeOutput {
    pub volume: ResourceRef,
    pub created: bool,
}

pub(super) struct EnsureVolume<'a> {
    pub backend: &'a Arc<dyn BackendDriver>,
    pub existing: Option<Resource>,
    pub spec: VolumeSpec,
    pub expires_at_ms: Option<u64>,
    pub delete_timeout: Duration,
}

#[async_trait]
impl SagaStep for EnsureVolume<'_> {
    type Output = VolumeOutput;

    fn name(&self) -> &str {
        "ensure volume"
    }

    fn interruptible(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<StepOutcome<VolumeOutput>, EngineError> {
        if let Some(existing) = &self.existing {
            info!(volume = %existing.reference, "reusing volume");
            self.backend.set_expiry(&existing.reference, self.expires_at_ms).await?;
            // Reused volumes hold data from earlier runs: no compensation
            return Ok(StepOutcome::done(VolumeOutput {
                volume: existing.reference.clone(),
                created: false,
            }));
        }
        let volume = self.backend.create_volume(&self.spec).await?.reference;
        info!(volume = %volume, "volume created");
        let undo =
            DeleteResource::new(Arc::clone(self.backend), volume.clone(), self.delete_timeout);
        Ok(StepOutcome::with_undo(VolumeOutput { volume, created: true }, undo))
    }
}

#[derive(Debug, Clone)]
pub(super) struct InstanceOutput {
    pub instance: ResourceRef,
    /// Whether the running instance is spot (false after a fallback)
    pub spot: bool,
}

pub(super) struct CreateInstance<'a> {
    pub backend: &'a Arc<dyn BackendDriver>,
    pub spec: InstanceSpec,
    pub spot_fallback: bool,
    pub delete_timeout: Duration,
}

#[async_trait]
impl SagaStep for CreateInstance<'_> {
    type Output = InstanceOutput;

    fn name(&self) -> &str {
        "create instance"
    }

    fn interruptible(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<StepOutcome<InstanceOutput>, EngineError> {
        let mut spec = self.spec.clone();
        let created = match self.backend.create_instance(&spec).await {
            Ok(created) => created,
            Err(e) if spec.spot && self.spot_fallback && is_capacity_error(&e) => {
                warn!(
                    instance = %spec.name,
                    error = %e,
                    "spot request failed, falling back to on-demand"
                );
                spec.spot = false;
                self.backend.create_instance(&spec).await?
            }
            Err(e) => return Err(e.into()),
        };
        let instance = created.reference;
        info!(instance = %instance, spot = spec.spot, "instance created");
        let undo =
            DeleteResource::new(Arc::clone(self.backend), instance.clone(), self.delete_timeout);
        Ok(StepOutcome::with_undo(InstanceOutput { instance, spot: spec.spot }, undo))
    }
}

pub(super) struct MeasureMemory<'a> {
    pub remote: &'a dyn RemoteExec,
    pub instance: &'a ResourceRef,
    pub policy: RetryPolicy,
}

#[async_trait]
impl SagaStep for MeasureMemory<'_> {
    type Output = u64;

    fn name(&self) -> &str {
        "query instance memory"
    }

    async fn execute(&self) -> Result<StepOutcome<u64>, EngineError> {
        Ok(StepOutcome::done(memory::measure(self.remote, self.instance, self.policy).await?))
    }
}

/// Optional DNS record. A failure here only warns: the deployment is
/// reachable by address.
pub(super) struct CreateDns<'a> {
    pub backend: &'a Arc<dyn BackendDriver>,
    pub spec: DnsRecordSpec,
    pub delete_timeout: Duration,
}

#[async_trait]
impl SagaStep for CreateDns<'_> {
    type Output = Option<ResourceRef>;

    fn name(&self) -> &str {
        "create dns record"
    }

    fn interruptible(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<StepOutcome<Option<ResourceRef>>, EngineError> {
        match self.backend.create_dns_record(&self.spec).await {
            Ok(record) => {
                info!(hostname = %self.spec.hostname, "dns record created");
                let record = record.reference;
                let backend = Arc::clone(self.backend);
                let undo = DeleteResource::new(backend, record.clone(), self.delete_timeout);
                Ok(StepOutcome::with_undo(Some(record), undo))
            }
            Err(e) => {
                warn!(hostname = %self.spec.hostname, error = %e, "could not create dns record");
                Ok(StepOutcome::done(None))
            }
        }
    }
}

/// Mount the volume over the template's pre-populated directory.
///
/// The template content is moved aside, the volume mounted, and the content
/// merged back without overwriting: a fresh volume is seeded with defaults
/// while a reused one keeps its files.
pub(super) struct AttachVolume<'a> {
    pub backend: &'a dyn BackendDriver,
    pub remote: &'a dyn RemoteExec,
    pub volume: &'a ResourceRef,
    pub instance: &'a ResourceRef,
    pub mount: MountSpec,
    pub policy: RetryPolicy,
}

impl AttachVolume<'_> {
    /// Safe to repeat: skips when the directory is absent or already moved.
    fn move_aside(&self) -> Vec<String> {
        let m = &self.mount.path;
        shell(format!("[ ! -e {m} ] || [ -e {m}.orig ] || mv {m} {m}.orig"))
    }

    fn merge_back(&self) -> Vec<String> {
        let m = &self.mount.path;
        shell(format!("if [ -d {m}.orig ]; then cp -rn {m}.orig/. {m}/ && rm -rf {m}.orig; fi"))
    }

    async fn run(&self, what: &str, argv: &[String]) -> Result<(), EngineError> {
        self.policy
            .run(what, move |_| async move {
                self.remote.exec(self.instance, argv, REMOTE_TIMEOUT).await.map(drop)
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SagaStep for AttachVolume<'_> {
    type Output = ();

    fn name(&self) -> &str {
        "attach volume"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        // Without the move the volume mounts over the template content and
        // the merge finds nothing to copy.
        if let Err(e) = self.run("move template content aside", &self.move_aside()).await {
            warn!(
                instance = %self.instance,
                path = %self.mount.path,
                error = %e,
                "could not move template content aside"
            );
        }
        self.backend.attach_volume(self.volume, self.instance, &self.mount).await?;
        info!(
            volume = %self.volume,
            instance = %self.instance,
            path = %self.mount.path,
            "volume attached"
        );
        self.run("merge template content", &self.merge_back()).await?;
        Ok(StepOutcome::done(()))
    }
}

/// Upload configuration, the on-instance deployment document, and the
/// volume's snapshot tags. Idempotent, so nothing to compensate.
pub(super) struct Configure<'a> {
    pub backend: &'a dyn BackendDriver,
    pub remote: &'a dyn RemoteExec,
    pub renderer: Option<&'a dyn ConfigRenderer>,
    pub instance: &'a ResourceRef,
    pub volume: &'a ResourceRef,
    pub params: &'a DeploymentParams,
    pub files: &'a [UploadFile],
    pub usable_memory: u64,
    pub mount_path: &'a str,
    pub threads: usize,
    pub tag_timeout: Duration,
}

#[async_trait]
impl SagaStep for Configure<'_> {
    type Output = ();

    fn name(&self) -> &str {
        "upload configuration"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        let mut files = match self.renderer {
            Some(renderer) => renderer.render(self.params, self.usable_memory)?,
            None => Vec::new(),
        };
        files.extend(self.files.iter().cloned());
        let document = encode_document(self.params)?;
        files.push(UploadFile::new(document_path(self.mount_path), document).mode(0o600));
        upload_files(self.remote, std::slice::from_ref(self.instance), &files, self.threads).await?;

        let tags = tag_update(self.params);
        let write = self.backend.set_tags(self.volume, &tags);
        match tokio::time::timeout(self.tag_timeout, write).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BackendError::Timeout {
                    op: "set snapshot tags".to_string(),
                    timeout: self.tag_timeout,
                }
                .into())
            }
        }
        info!(volume = %self.volume, keys = tags.len(), "snapshot written");
        Ok(StepOutcome::done(()))
    }
}

#[cfg(test)]
#[path = "steps_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Singleton template image builds.
//!
//! A template is a machine image with the software preinstalled, shared by
//! every deployment of the same version key. Building one takes minutes, so
//! concurrent callers arbitrate through [`RaceCoordinator`]: one builds while
//! the rest wait for its image to appear.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_adapters::{BackendDriver, ImageSpec, InstanceSpec, RemoteExec, SessionStore};
use fleet_core::{id, tags, Clock, Resource, ResourceKind, ResourceRef, TagFilter, VersionKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::duplicate::{pick_winner, resolve};
use crate::fanout::{upload_files, UploadFile};
use crate::race::{HeartbeatHandle, RaceCoordinator, RaceDecision};
use crate::saga::{Compensation, DeleteResource, Saga, SagaStep, StepOutcome};
use crate::snapshot::Arch;
use crate::EngineError;

/// What to bake into a template image.
#[derive(Debug, Clone)]
pub struct TemplateSpec {
    pub version_key: VersionKey,
    /// Builder instances and images are named `<prefix>-<suffix>`
    pub name_prefix: String,
    /// Image the builder boots from; `None` uses the backend's base OS
    pub base_image: Option<String>,
    /// Builder size; empty picks the architecture default
    pub instance_type: String,
    pub arch: Arch,
    pub install_script: Vec<u8>,
    pub script_path: String,
    /// Extra files placed on the builder before the script runs
    pub files: Vec<UploadFile>,
    pub build_timeout: Duration,
    pub owner: String,
}

impl TemplateSpec {
    pub fn new(version_key: VersionKey, install_script: impl Into<Vec<u8>>) -> Self {
        Self {
            version_key,
            name_prefix: "fleet-tmpl".to_string(),
            base_image: None,
            instance_type: String::new(),
            arch: Arch::default(),
            install_script: install_script.into(),
            script_path: "/tmp/fleet-install.sh".to_string(),
            files: Vec::new(),
            build_timeout: Duration::from_secs(30 * 60),
            owner: String::new(),
        }
    }

    fleet_core::setters! {
        into {
            name_prefix: String,
            instance_type: String,
            script_path: String,
            owner: String,
        }
        set {
            arch: Arch,
            files: Vec<UploadFile>,
            build_timeout: Duration,
        }
        option {
            base_image: String,
        }
    }
}

/// How a template name was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// Already in inventory
    Existing { name: String },
    /// Another process finished it while we waited
    BuiltByOther { name: String },
    /// Built by this process (or a concurrent duplicate that won resolution)
    Built { name: String },
    /// Dry run: what would be built
    Planned { builder_name: String, candidates: usize },
}

impl TemplateOutcome {
    pub fn name(&self) -> &str {
        match self {
            TemplateOutcome::Existing { name }
            | TemplateOutcome::BuiltByOther { name }
            | TemplateOutcome::Built { name } => name,
            TemplateOutcome::Planned { builder_name, .. } => builder_name,
        }
    }
}

pub struct TemplateBuilder<C: Clock> {
    backend: Arc<dyn BackendDriver>,
    remote: Arc<dyn RemoteExec>,
    sessions: Arc<dyn SessionStore>,
    clock: C,
    config: CoordinatorConfig,
    interrupt: CancellationToken,
    dry_run: bool,
    no_vacuum: bool,
}

impl<C: Clock> TemplateBuilder<C> {
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
            dry_run: false,
            no_vacuum: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Leave a failed builder running for inspection.
    pub fn no_vacuum(mut self, no_vacuum: bool) -> Self {
        self.no_vacuum = no_vacuum;
        self
    }

    /// Return the template for `spec.version_key`, building it if needed.
    pub async fn ensure(&self, spec: &TemplateSpec) -> Result<TemplateOutcome, EngineError> {
        let key = &spec.version_key;
        let images = self.find_images(key).await?;
        if !images.is_empty() {
            let name = if self.dry_run {
                pick_winner(&images).ok_or(EngineError::NoCandidates)?.name().to_string()
            } else {
                let winner = resolve(&*self.backend, images, self.config.delete_timeout).await?;
                winner.name().to_string()
            };
            info!(version_key = %key, template = %name, "template exists");
            return Ok(TemplateOutcome::Existing { name });
        }

        let builds = self.find_builds(key).await?;
        let builder_name = format!("{}-{}", spec.name_prefix, id::name_suffix(10));
        if self.dry_run {
            info!(
                version_key = %key,
                builder = %builder_name,
                in_progress = builds.len(),
                "dry run, not building"
            );
            return Ok(TemplateOutcome::Planned { builder_name, candidates: builds.len() });
        }

        let race = RaceCoordinator::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.sessions),
            self.clock.clone(),
            self.config.clone(),
            key.clone(),
        );
        let this = self;
        let poll = move || async move { this.poll_image(key).await };
        let decision = tokio::select! {
            biased;
            _ = self.interrupt.cancelled() => {
                return Err(EngineError::Interrupted { step: "wait for template".to_string() });
            }
            decision = race.arbitrate(&builds, poll) => decision?,
        };
        info!(version_key = %key, %decision, "race decision");

        if let RaceDecision::WaitedThenExists { name } = decision {
            return Ok(TemplateOutcome::BuiltByOther { name });
        }
        if decision.needs_vacuum() {
            race.vacuum(&builds).await?;
        }

        let image = self.build(spec, &race, builder_name).await?;

        let images = self.find_images(key).await?;
        if images.iter().any(|i| i.id() == image.id) {
            race.on_success()?;
        } else {
            warn!(
                version_key = %key,
                image = %image.name,
                "new template not listed yet, keeping session"
            );
        }
        let name = if images.len() > 1 {
            resolve(&*self.backend, images, self.config.delete_timeout).await?.name().to_string()
        } else {
            image.name.clone()
        };
        info!(version_key = %key, template = %name, "template ready");
        Ok(TemplateOutcome::Built { name })
    }

    async fn build(
        &self,
        spec: &TemplateSpec,
        race: &RaceCoordinator<C>,
        builder_name: String,
    ) -> Result<ResourceRef, EngineError> {
        let key = &spec.version_key;
        let mut build_tags = tags::from_pairs([
            (tags::TYPE, tags::TYPE_TEMPLATE_BUILD),
            (tags::TEMPLATE_VERSION, key.as_str()),
        ]);
        build_tags.extend(race.tags_for_new_attempt()?);
        if !spec.owner.is_empty() {
            build_tags.insert(tags::OWNER.to_string(), spec.owner.clone());
        }
        let instance_type = if spec.instance_type.is_empty() {
            spec.arch.default_instance_type(self.backend.backend_type()).to_string()
        } else {
            spec.instance_type.clone()
        };
        let mut instance = InstanceSpec::new(&builder_name, instance_type)
            .tags(build_tags)
            .arch(spec.arch.to_string());
        instance.image = spec.base_image.clone();

        let mut saga = Saga::new(self.interrupt.clone()).no_vacuum(self.no_vacuum);
        info!(
            run = %saga.run_id(),
            version_key = %key,
            builder = %builder_name,
            "building template"
        );

        let builder = saga
            .step(CreateBuilder {
                backend: Arc::clone(&self.backend),
                spec: instance,
                delete_timeout: self.config.delete_timeout,
            })
            .await?;

        let heartbeat = Arc::new(race.start_heartbeat(vec![builder.clone()]));
        saga.register("heartbeat", StopHeartbeat(Arc::clone(&heartbeat)));

        let mut files = spec.files.clone();
        files.push(UploadFile::new(&spec.script_path, spec.install_script.clone()).mode(0o755));
        saga.step(Upload { remote: Arc::clone(&self.remote), target: builder.clone(), files })
            .await?;
        saga.step(RunScript {
            remote: Arc::clone(&self.remote),
            target: builder.clone(),
            script_path: spec.script_path.clone(),
            timeout: spec.build_timeout,
        })
        .await?;
        saga.step(StopBuilder {
            backend: Arc::clone(&self.backend),
            target: builder.clone(),
            timeout: self.config.delete_timeout,
        })
        .await?;

        let mut image_tags = tags::from_pairs([
            (tags::TYPE, tags::TYPE_TEMPLATE),
            (tags::TEMPLATE_VERSION, key.as_str()),
        ]);
        if !spec.owner.is_empty() {
            image_tags.insert(tags::OWNER.to_string(), spec.owner.clone());
        }
        let image = saga
            .step(CaptureImage {
                backend: Arc::clone(&self.backend),
                spec: ImageSpec::new(&builder_name, builder.clone())
                    .description(format!("fleet template {key}"))
                    .tags(image_tags),
            })
            .await?;

        heartbeat.stop().await;
        saga.commit();

        info!(builder = %builder, "terminating builder");
        if let Err(e) = self.backend.delete(&builder, self.config.delete_timeout).await {
            error!(builder = %builder, error = %e, "could not terminate builder instance");
        }
        Ok(image)
    }

    async fn find_images(&self, key: &VersionKey) -> Result<Vec<Resource>, EngineError> {
        let filter = TagFilter::new()
            .with(tags::TYPE, tags::TYPE_TEMPLATE)
            .with(tags::TEMPLATE_VERSION, key.as_str());
        let mut images = self.backend.list(ResourceKind::Image, &filter).await?;
        images.retain(|r| !r.is_terminated());
        Ok(images)
    }

    async fn find_builds(&self, key: &VersionKey) -> Result<Vec<Resource>, EngineError> {
        let filter = TagFilter::new()
            .with(tags::TYPE, tags::TYPE_TEMPLATE_BUILD)
            .with(tags::TEMPLATE_VERSION, key.as_str());
        let mut builds = self.backend.list(ResourceKind::Instance, &filter).await?;
        builds.retain(|r| !r.is_terminated());
        Ok(builds)
    }

    async fn poll_image(&self, key: &VersionKey) -> Option<String> {
        match self.find_images(key).await {
            Ok(images) => pick_winner(&images).map(|r| r.name().to_string()),
            Err(e) => {
                debug!(version_key = %key, error = %e, "template poll failed");
                None
            }
        }
    }
}

struct CreateBuilder {
    backend: Arc<dyn BackendDriver>,
    spec: InstanceSpec,
    delete_timeout: Duration,
}

#[async_trait]
impl SagaStep for CreateBuilder {
    type Output = ResourceRef;

    fn name(&self) -> &str {
        "create builder instance"
    }

    fn interruptible(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<StepOutcome<ResourceRef>, EngineError> {
        let builder = self.backend.create_instance(&self.spec).await?.reference;
        let undo =
            DeleteResource::new(Arc::clone(&self.backend), builder.clone(), self.delete_timeout);
        Ok(StepOutcome::with_undo(builder, undo))
    }
}

struct StopHeartbeat(Arc<HeartbeatHandle>);

#[async_trait]
impl Compensation for StopHeartbeat {
    fn describe(&self) -> String {
        "stop heartbeat".to_string()
    }

    async fn run(self: Box<Self>) -> Result<(), EngineError> {
        self.0.stop().await;
        Ok(())
    }
}

struct Upload {
    remote: Arc<dyn RemoteExec>,
    target: ResourceRef,
    files: Vec<UploadFile>,
}

#[async_trait]
impl SagaStep for Upload {
    type Output = ();

    fn name(&self) -> &str {
        "upload install script"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        upload_files(&*self.remote, std::slice::from_ref(&self.target), &self.files, 1).await?;
        Ok(StepOutcome::done(()))
    }
}

struct RunScript {
    remote: Arc<dyn RemoteExec>,
    target: ResourceRef,
    script_path: String,
    timeout: Duration,
}

#[async_trait]
impl SagaStep for RunScript {
    type Output = ();

    fn name(&self) -> &str {
        "run install script"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        let argv = vec!["bash".to_string(), self.script_path.clone()];
        let out = self.remote.exec(&self.target, &argv, self.timeout).await?;
        debug!(target = %self.target.id, stdout = %out.stdout_lossy(), "install script finished");
        Ok(StepOutcome::done(()))
    }
}

struct StopBuilder {
    backend: Arc<dyn BackendDriver>,
    target: ResourceRef,
    timeout: Duration,
}

#[async_trait]
impl SagaStep for StopBuilder {
    type Output = ();

    fn name(&self) -> &str {
        "stop builder instance"
    }

    async fn execute(&self) -> Result<StepOutcome<()>, EngineError> {
        self.backend.stop_instance(&self.target, self.timeout).await?;
        Ok(StepOutcome::done(()))
    }
}

/// Capture the image. A captured image is complete and usable by others,
/// so it carries no compensation.
struct CaptureImage {
    backend: Arc<dyn BackendDriver>,
    spec: ImageSpec,
}

#[async_trait]
impl SagaStep for CaptureImage {
    type Output = ResourceRef;

    fn name(&self) -> &str {
        "create template image"
    }

    fn interruptible(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<StepOutcome<ResourceRef>, EngineError> {
        Ok(StepOutcome::done(self.backend.create_image(&self.spec).await?.reference))
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;

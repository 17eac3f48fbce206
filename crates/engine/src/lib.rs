// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-engine: provisioning coordination without a shared database.
//!
//! The only shared state is the per-resource tag store. On top of it this
//! crate layers leaderless arbitration for singleton builds ([`race`]),
//! compensating multi-step provisioning ([`saga`], [`deploy`]), config
//! snapshots that make a volume self-describing ([`snapshot`]), and
//! post-hoc repair of double builds ([`duplicate`]).

pub mod config;
pub mod deploy;
pub mod duplicate;
pub mod env;
mod error;
pub mod fanout;
pub mod interrupt;
pub mod race;
pub mod retry;
pub mod saga;
pub mod snapshot;
pub mod template;

pub use config::{ConfigError, CoordinatorConfig};
pub use deploy::{ConfigRenderer, DeploymentRequest, DeploymentResult, Deployer};
pub use duplicate::{pick_winner, resolve};
pub use error::EngineError;
pub use fanout::{upload_files, UploadFile};
pub use race::{HeartbeatHandle, RaceCoordinator, RaceDecision};
pub use retry::RetryPolicy;
pub use saga::{Compensation, DeleteResource, Saga, SagaStep, StepOutcome};
pub use snapshot::{
    decode_document, encode_document, reconstruct, snapshot, tag_update, Arch, DeploymentParams,
    Overrides, Secrets, SnapshotError, Sources,
};
pub use template::{TemplateBuilder, TemplateOutcome, TemplateSpec};

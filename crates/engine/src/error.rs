// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use fleet_adapters::{BackendError, RemoteError, SessionError};
use fleet_core::VersionKeyError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::snapshot::SnapshotError;

/// Errors surfaced by coordinator operations.
///
/// Collaborator errors pass through transparently so the final message
/// carries the provider's own text.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    VersionKey(#[from] VersionKeyError),
    #[error("{step}: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("interrupted during {step}")]
    Interrupted { step: String },
    #[error("no candidates to resolve")]
    NoCandidates,
    #[error("volume {0} already exists; reattach to it or pass force to reuse it")]
    VolumeExists(String),
    #[error("volume {0} not found")]
    VolumeNotFound(String),
    #[error("not enough memory: {usable} bytes usable after reserving {reserved} (min 1 GiB)")]
    InsufficientMemory { usable: i64, reserved: u64 },
    #[error("malformed `free -b` output: {0:?}")]
    MalformedMemory(String),
}

impl EngineError {
    /// Name of the saga step that failed, if this is a step failure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            EngineError::StepFailed { step, .. } | EngineError::Interrupted { step } => Some(step),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, EngineError::Interrupted { .. })
    }
}

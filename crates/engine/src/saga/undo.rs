// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_adapters::BackendDriver;
use fleet_core::{ResourceKind, ResourceRef};

use super::Compensation;
use crate::EngineError;

/// Delete (or, for instances, terminate) one resource. A resource that is
/// already gone counts as compensated.
pub struct DeleteResource {
    backend: Arc<dyn BackendDriver>,
    target: ResourceRef,
    timeout: Duration,
}

impl DeleteResource {
    pub fn new(backend: Arc<dyn BackendDriver>, target: ResourceRef, timeout: Duration) -> Self {
        Self { backend, target, timeout }
    }
}

#[async_trait]
impl Compensation for DeleteResource {
    fn describe(&self) -> String {
        let verb = match self.target.kind {
            ResourceKind::Instance => "terminate",
            _ => "delete",
        };
        format!("{verb} {}", self.target)
    }

    async fn run(self: Box<Self>) -> Result<(), EngineError> {
        match self.backend.delete(&self.target, self.timeout).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(target = %self.target, "already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

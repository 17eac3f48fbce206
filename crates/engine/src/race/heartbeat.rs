// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic heartbeat refresher for an in-progress singleton build.

use std::sync::Arc;
use std::time::Duration;

use fleet_adapters::BackendDriver;
use fleet_core::{tags, Clock, ResourceRef};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running heartbeat task.
///
/// [`stop`](Self::stop) cancels the loop and waits for it to exit; a tag
/// write already in flight completes first, so no refresh can land after
/// the caller starts tearing the resource down. Stopping twice is a no-op.
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatHandle {
    /// A handle with nothing to stop (local backends).
    pub fn noop() -> Self {
        Self { cancel: CancellationToken::new(), task: Mutex::new(None) }
    }

    pub(crate) fn spawn<C: Clock>(
        backend: Arc<dyn BackendDriver>,
        clock: C,
        targets: Vec<ResourceRef>,
        period: Duration,
        tag_timeout: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => refresh(&*backend, &clock, &targets, tag_timeout).await,
                }
            }
        });
        Self { cancel, task: Mutex::new(Some(task)) }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Write the current time to every target. Failures only log: the next
/// tick retries, and a missed beat just ages the record.
async fn refresh<C: Clock>(
    backend: &dyn BackendDriver,
    clock: &C,
    targets: &[ResourceRef],
    tag_timeout: Duration,
) {
    let beat = tags::from_pairs([(tags::HEARTBEAT, clock.epoch_secs().to_string())]);
    for target in targets {
        match tokio::time::timeout(tag_timeout, backend.set_tags(target, &beat)).await {
            Ok(Ok(())) => tracing::trace!(target = %target.id, "heartbeat refreshed"),
            Ok(Err(e)) => {
                tracing::debug!(target = %target.id, error = %e, "failed to update heartbeat tag")
            }
            Err(_) => tracing::debug!(target = %target.id, "heartbeat tag update timed out"),
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;

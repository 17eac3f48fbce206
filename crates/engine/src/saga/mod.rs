// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered resource-creation steps with reverse-order compensation.
//!
//! Each step is an object carrying only its own inputs; its compensation
//! captures only what the step itself produced. When a step fails (or an
//! interrupt arrives) every compensation registered so far runs, newest
//! first, and the original failure is returned.

mod undo;

pub use undo::DeleteResource;

use async_trait::async_trait;
use fleet_core::RunId;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::EngineError;

/// Undo action for one completed step.
#[async_trait]
pub trait Compensation: Send + Sync {
    /// Human-readable description, logged before the action runs.
    fn describe(&self) -> String;

    async fn run(self: Box<Self>) -> Result<(), EngineError>;
}

/// Result of a step: its output plus the compensation that undoes it.
pub struct StepOutcome<T> {
    pub output: T,
    pub undo: Option<Box<dyn Compensation>>,
}

impl<T> StepOutcome<T> {
    /// Completed with nothing to undo.
    pub fn done(output: T) -> Self {
        Self { output, undo: None }
    }

    pub fn with_undo(output: T, undo: impl Compensation + 'static) -> Self {
        Self { output, undo: Some(Box::new(undo)) }
    }
}

#[async_trait]
pub trait SagaStep: Send + Sync {
    type Output: Send;

    fn name(&self) -> &str;

    /// Whether an interrupt may abandon this step mid-flight. Steps that
    /// create billable resources return false: they run to completion so
    /// their compensation is registered before the unwind.
    fn interruptible(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<StepOutcome<Self::Output>, EngineError>;
}

struct Completed {
    step: String,
    undo: Box<dyn Compensation>,
}

pub struct Saga {
    run_id: RunId,
    interrupt: CancellationToken,
    no_vacuum: bool,
    completed: Vec<Completed>,
}

impl Saga {
    pub fn new(interrupt: CancellationToken) -> Self {
        Self { run_id: RunId::new(), interrupt, no_vacuum: false, completed: Vec::new() }
    }

    /// Log compensations instead of running them, leaving resources in
    /// place for inspection.
    pub fn no_vacuum(mut self, no_vacuum: bool) -> Self {
        self.no_vacuum = no_vacuum;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Number of compensations currently registered
    pub fn pending(&self) -> usize {
        self.completed.len()
    }

    /// Run one step. On failure or interrupt, unwinds everything registered
    /// so far before returning.
    pub async fn step<S: SagaStep>(&mut self, step: S) -> Result<S::Output, EngineError> {
        let name = step.name().to_string();
        if self.interrupt.is_cancelled() {
            return Err(self.interrupted(name).await);
        }

        info!(run = %self.run_id, step = %name, "step starting");
        let result = if step.interruptible() {
            let interrupt = self.interrupt.clone();
            tokio::select! {
                biased;
                _ = interrupt.cancelled() => None,
                result = step.execute() => Some(result),
            }
        } else {
            Some(step.execute().await)
        };
        let Some(result) = result else {
            return Err(self.interrupted(name).await);
        };

        match result {
            Ok(outcome) => {
                if let Some(undo) = outcome.undo {
                    self.completed.push(Completed { step: name.clone(), undo });
                }
                info!(run = %self.run_id, step = %name, "step finished");
                if self.interrupt.is_cancelled() {
                    return Err(self.interrupted(name).await);
                }
                Ok(outcome.output)
            }
            Err(e) => {
                error!(run = %self.run_id, step = %name, error = %e, "step failed");
                self.unwind().await;
                Err(EngineError::StepFailed { step: name, source: Box::new(e) })
            }
        }
    }

    /// Register a compensation for work done outside [`Saga::step`].
    pub fn register(&mut self, step: &str, undo: impl Compensation + 'static) {
        self.completed.push(Completed { step: step.to_string(), undo: Box::new(undo) });
    }

    /// Keep everything built so far.
    pub fn commit(mut self) {
        info!(run = %self.run_id, kept = self.completed.len(), "saga committed");
        self.completed.clear();
    }

    /// Unwind after a failure that happened between steps.
    pub async fn abort(mut self, reason: &EngineError) {
        warn!(run = %self.run_id, error = %reason, "aborting saga");
        self.unwind().await;
    }

    async fn interrupted(&mut self, step: String) -> EngineError {
        warn!(run = %self.run_id, step = %step, "interrupted, cleaning up");
        self.unwind().await;
        EngineError::Interrupted { step }
    }

    async fn unwind(&mut self) {
        while let Some(Completed { step, undo }) = self.completed.pop() {
            let action = undo.describe();
            if self.no_vacuum {
                warn!(run = %self.run_id, step = %step, %action, "no-vacuum set, leaving in place");
                continue;
            }
            warn!(run = %self.run_id, step = %step, %action, "compensating");
            if let Err(e) = undo.run().await {
                error!(
                    run = %self.run_id,
                    step = %step,
                    %action,
                    error = %e,
                    "compensation failed"
                );
            }
        }
    }
}

impl Drop for Saga {
    fn drop(&mut self) {
        for Completed { step, undo } in &self.completed {
            warn!(
                run = %self.run_id,
                step = %step,
                action = %undo.describe(),
                "saga dropped without commit or unwind"
            );
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

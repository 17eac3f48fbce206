// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leaderless arbitration for singleton builds.
//!
//! Processes on different hosts agree on who builds a singleton (a template
//! image for one version key) using nothing but tags on the in-progress
//! build instance: a session token naming the builder, and a heartbeat
//! timestamp it refreshes while alive. Exclusion is best-effort; the
//! duplicate resolver repairs the rare double build.

mod heartbeat;

pub use heartbeat::HeartbeatHandle;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fleet_adapters::{BackendDriver, SessionStore};
use fleet_core::{tags, Clock, Resource, ResourceRef, SessionToken, Tags, VersionKey};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::EngineError;

/// Outcome of one race check. Recomputed on every start, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceDecision {
    /// Nothing in flight
    Proceed,
    /// In-flight work is ours, stale, or local; remove it first
    ProceedAfterVacuum,
    /// Waited for another builder until the deadline; remove its work and take over
    WaitedThenProceed,
    /// Another builder finished while we waited
    WaitedThenExists { name: String },
}

impl RaceDecision {
    pub fn needs_vacuum(&self) -> bool {
        matches!(self, RaceDecision::ProceedAfterVacuum | RaceDecision::WaitedThenProceed)
    }

    pub fn should_build(&self) -> bool {
        !matches!(self, RaceDecision::WaitedThenExists { .. })
    }
}

impl fmt::Display for RaceDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceDecision::Proceed => f.write_str("proceed"),
            RaceDecision::ProceedAfterVacuum => f.write_str("proceed after vacuum"),
            RaceDecision::WaitedThenProceed => f.write_str("waited, then proceed"),
            RaceDecision::WaitedThenExists { name } => write!(f, "waited, {name} exists"),
        }
    }
}

/// Race coordinator for one version key.
pub struct RaceCoordinator<C: Clock> {
    backend: Arc<dyn BackendDriver>,
    sessions: Arc<dyn SessionStore>,
    clock: C,
    config: CoordinatorConfig,
    key: VersionKey,
    token: Mutex<Option<SessionToken>>,
}

impl<C: Clock> RaceCoordinator<C> {
    pub fn new(
        backend: Arc<dyn BackendDriver>,
        sessions: Arc<dyn SessionStore>,
        clock: C,
        config: CoordinatorConfig,
        key: VersionKey,
    ) -> Self {
        Self { backend, sessions, clock, config, key, token: Mutex::new(None) }
    }

    pub fn key(&self) -> &VersionKey {
        &self.key
    }

    fn is_local(&self) -> bool {
        self.backend.backend_type().is_local()
    }

    /// This process's session token, loaded or created on first use.
    fn session(&self) -> Result<SessionToken, EngineError> {
        let mut cached = self.token.lock();
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.sessions.load_or_create(&self.key)?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Decide whether to build, clean up and build, or wait.
    ///
    /// `candidates` are the live in-progress builds for this key;
    /// `poll_exists` re-checks whether the finished singleton has appeared
    /// and returns its name.
    pub async fn arbitrate<F, Fut>(
        &self,
        candidates: &[Resource],
        mut poll_exists: F,
    ) -> Result<RaceDecision, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let Some(candidate) = candidates.first() else {
            debug!(version_key = %self.key, "no build in progress");
            return Ok(RaceDecision::Proceed);
        };

        if self.is_local() {
            info!(version_key = %self.key, "local backend: vacuuming existing build (local work)");
            return Ok(RaceDecision::ProceedAfterVacuum);
        }

        let session = self.session()?;
        if candidate.tag(tags::SESSION) == Some(session.as_str()) {
            info!(
                version_key = %self.key,
                instance = %candidate.id(),
                "found our own abandoned build, vacuuming"
            );
            return Ok(RaceDecision::ProceedAfterVacuum);
        }

        let heartbeat = candidate.tag(tags::HEARTBEAT).and_then(|raw| {
            let parsed = raw.trim().parse::<u64>().ok();
            if parsed.is_none() {
                warn!(version_key = %self.key, heartbeat = raw, "unparseable heartbeat, using age");
            }
            parsed
        });

        match heartbeat {
            Some(secs) => {
                let age = Duration::from_secs(self.clock.epoch_secs().saturating_sub(secs));
                if age > self.config.stale_after {
                    info!(
                        version_key = %self.key,
                        instance = %candidate.id(),
                        age = ?age,
                        "stale heartbeat, vacuuming"
                    );
                    return Ok(RaceDecision::ProceedAfterVacuum);
                }
                info!(
                    version_key = %self.key,
                    instance = %candidate.id(),
                    age = ?age,
                    "active build by another process"
                );
            }
            None => {
                let age_ms = self.clock.epoch_ms().saturating_sub(candidate.created_at_ms);
                let age = Duration::from_millis(age_ms);
                if age > self.config.stale_after {
                    info!(
                        version_key = %self.key,
                        instance = %candidate.id(),
                        age = ?age,
                        "old build without heartbeat, vacuuming"
                    );
                    return Ok(RaceDecision::ProceedAfterVacuum);
                }
            }
        }

        info!(
            version_key = %self.key,
            timeout = %fleet_core::format_duration(self.config.wait_timeout),
            "build in progress by another process, waiting"
        );
        let start = tokio::time::Instant::now();
        while start.elapsed() < self.config.wait_timeout {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Some(name) = poll_exists().await {
                info!(version_key = %self.key, %name, "built by another process");
                return Ok(RaceDecision::WaitedThenExists { name });
            }
            debug!(version_key = %self.key, "still waiting for another process");
        }

        warn!(
            version_key = %self.key,
            "timed out waiting for another process, vacuuming and proceeding"
        );
        Ok(RaceDecision::WaitedThenProceed)
    }

    /// Race tags to attach when creating a new build instance, so the
    /// heartbeat record exists before anyone else can observe it.
    pub fn tags_for_new_attempt(&self) -> Result<Tags, EngineError> {
        if self.is_local() {
            return Ok(Tags::new());
        }
        let session = self.session()?;
        Ok(tags::from_pairs([
            (tags::SESSION, session.to_string()),
            (tags::HEARTBEAT, self.clock.epoch_secs().to_string()),
        ]))
    }

    /// Start refreshing the heartbeat on `targets`. No-op on local backends.
    pub fn start_heartbeat(&self, targets: Vec<ResourceRef>) -> HeartbeatHandle {
        if self.is_local() {
            return HeartbeatHandle::noop();
        }
        HeartbeatHandle::spawn(
            Arc::clone(&self.backend),
            self.clock.clone(),
            targets,
            self.config.heartbeat_interval,
            self.config.tag_timeout,
        )
    }

    /// Delete candidate builds. Failures abort: building next to a live
    /// leftover would double-bill.
    pub async fn vacuum(&self, candidates: &[Resource]) -> Result<(), EngineError> {
        for candidate in candidates {
            info!(
                version_key = %self.key,
                instance = %candidate.id(),
                name = %candidate.name(),
                "vacuuming build instance"
            );
            match self.backend.delete(&candidate.reference, self.config.delete_timeout).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(instance = %candidate.id(), "already gone"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Forget this process's session token. Call only once the built
    /// singleton is visible in inventory.
    pub fn on_success(&self) -> Result<(), EngineError> {
        self.sessions.clear(&self.key)?;
        self.token.lock().take();
        debug!(version_key = %self.key, "session cleared");
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

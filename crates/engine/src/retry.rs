// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded fixed-backoff retry for transient remote failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Instance memory query: tolerates boot latency
    pub const MEMORY_CHECK: Self = Self { attempts: 10, backoff: Duration::from_secs(3) };
    /// Other remote steps (volume move/merge, service start)
    pub const REMOTE_STEP: Self = Self { attempts: 3, backoff: Duration::from_secs(5) };

    pub const fn once() -> Self {
        Self { attempts: 1, backoff: Duration::ZERO }
    }

    /// Run `op` until it succeeds or the attempts are spent, sleeping
    /// `backoff` between attempts. Returns the last error.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    tracing::warn!(what, attempt, error = %e, "giving up after final attempt");
                    return Err(e);
                }
                Err(e) => {
                    tracing::debug!(
                        what,
                        attempt,
                        of = attempts,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

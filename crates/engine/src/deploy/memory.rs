// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Usable-memory check for a freshly booted instance.

use std::time::Duration;

use fleet_adapters::RemoteExec;
use fleet_core::{BackendType, ResourceRef};

use crate::retry::RetryPolicy;
use crate::EngineError;

pub const GIB: u64 = 1 << 30;

/// Smallest usable amount the service will run with
pub const MIN_USABLE: u64 = GIB;

const MEASURE_TIMEOUT: Duration = Duration::from_secs(60);

/// Memory held back for the OS and sidecar services.
pub fn reservation(backend: BackendType) -> u64 {
    if backend.is_local() {
        3 * GIB
    } else {
        6 * GIB
    }
}

/// The `Mem:` row of `free -b` output, if the output is well formed.
pub(crate) fn mem_line(stdout: &str) -> Option<&str> {
    stdout.lines().nth(1).filter(|line| line.starts_with("Mem:"))
}

/// Total bytes from a `Mem:` row, minus `reserved`.
pub(crate) fn usable_memory(line: &str, reserved: u64) -> Result<u64, EngineError> {
    let total: i64 = line
        .split_whitespace()
        .nth(1)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| EngineError::MalformedMemory(line.to_string()))?;
    let usable = total.saturating_sub(reserved as i64);
    if usable < MIN_USABLE as i64 {
        return Err(EngineError::InsufficientMemory { usable, reserved });
    }
    Ok(usable as u64)
}

/// Query total memory, retrying while the instance finishes booting.
///
/// Connection failures and truncated output are retried; a parse failure
/// of a well-formed row, or too little memory, is final.
pub(crate) async fn measure(
    remote: &dyn RemoteExec,
    target: &ResourceRef,
    policy: RetryPolicy,
) -> Result<u64, EngineError> {
    let argv = &["free".to_string(), "-b".to_string()];
    let line = policy
        .run("query instance memory", move |_| async move {
            let stdout = remote.exec(target, argv, MEASURE_TIMEOUT).await?.stdout_lossy();
            match mem_line(&stdout) {
                Some(line) => Ok(line.to_string()),
                None => Err(EngineError::MalformedMemory(stdout)),
            }
        })
        .await?;
    let reserved = reservation(target.backend);
    let usable = usable_memory(&line, reserved)?;
    tracing::info!(target = %target.id, usable_gib = usable / GIB, "instance memory");
    Ok(usable)
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

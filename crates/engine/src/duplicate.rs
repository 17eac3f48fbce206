// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-hoc convergence after a double build.

use std::time::Duration;

use fleet_adapters::BackendDriver;
use fleet_core::Resource;
use tracing::{info, warn};

use crate::EngineError;

/// Earliest-created candidate, ties broken by id.
pub fn pick_winner(candidates: &[Resource]) -> Option<&Resource> {
    candidates.iter().min_by(|a, b| {
        a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id().cmp(b.id()))
    })
}

/// Keep the oldest candidate and delete the rest. Deletion failures are
/// logged; the winner is returned regardless.
pub async fn resolve(
    backend: &dyn BackendDriver,
    candidates: Vec<Resource>,
    timeout: Duration,
) -> Result<Resource, EngineError> {
    let winner = pick_winner(&candidates).cloned().ok_or(EngineError::NoCandidates)?;
    for loser in candidates.iter().filter(|c| c.id() != winner.id()) {
        info!(
            name = %loser.name(),
            id = %loser.id(),
            created = %created_at(loser),
            keeping = %winner.name(),
            "cleaning up duplicate"
        );
        if let Err(e) = backend.delete(&loser.reference, timeout).await {
            warn!(name = %loser.name(), id = %loser.id(), error = %e, "failed to delete duplicate");
        }
    }
    Ok(winner)
}

fn created_at(resource: &Resource) -> String {
    chrono::DateTime::from_timestamp_millis(resource.created_at_ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| resource.created_at_ms.to_string())
}

#[cfg(test)]
#[path = "duplicate_tests.rs"]
mod tests;

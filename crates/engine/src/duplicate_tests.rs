// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_adapters::{BackendError, BackendOp, FakeBackend};
use fleet_core::{BackendType, Clock, FakeClock, ResourceKind, Tags};

const T: Duration = Duration::from_secs(300);

fn image(backend: &FakeBackend, name: &str, created_at_ms: u64) -> Resource {
    let r = backend.seed(ResourceKind::Image, name, Tags::new(), created_at_ms);
    backend.get(&r.id).unwrap()
}

#[test]
fn winner_is_earliest_then_lowest_id() {
    let backend = FakeBackend::new(BackendType::Aws);
    let later = image(&backend, "b", 2_000);
    let tie_first = image(&backend, "c", 1_000);
    let tie_second = image(&backend, "a", 1_000);
    let all = vec![later, tie_second, tie_first.clone()];
    // seeded ids are sequential, so the first image seeded at 1_000 has the lower id
    assert_eq!(pick_winner(&all).unwrap().id(), tie_first.id());
    assert!(pick_winner(&[]).is_none());
}

#[tokio::test]
async fn empty_input_is_an_error() {
    let backend = FakeBackend::new(BackendType::Aws);
    let err = resolve(&backend, Vec::new(), T).await.unwrap_err();
    assert!(matches!(err, EngineError::NoCandidates));
}

#[tokio::test]
async fn single_candidate_deletes_nothing() {
    let backend = FakeBackend::new(BackendType::Aws);
    let only = image(&backend, "t", 1);
    assert_eq!(resolve(&backend, vec![only.clone()], T).await.unwrap(), only);
    assert!(backend.deleted().is_empty());
}

#[tokio::test]
async fn deletes_all_losers_despite_failures() {
    let backend = FakeBackend::new(BackendType::Gcp);
    let newest = image(&backend, "t3", 3_000);
    let oldest = image(&backend, "t1", 1_000);
    let middle = image(&backend, "t2", 2_000);
    backend.fail_next(BackendOp::Delete, BackendError::Provider("image in use".into()));

    let winner = resolve(&backend, vec![newest.clone(), oldest.clone(), middle.clone()], T)
        .await
        .unwrap();
    assert_eq!(winner.id(), oldest.id());
    assert_eq!(backend.deleted(), vec![newest.id().to_string(), middle.id().to_string()]);
    // the failed delete left the newest in place; the middle one is gone
    assert!(backend.get(newest.id()).is_some());
    assert!(backend.get(middle.id()).is_none());
}

#[tokio::test]
async fn two_racers_converge_on_the_earlier_build() {
    let clock = FakeClock::new();
    let backend = FakeBackend::with_clock(BackendType::Aws, clock.clone());
    let first = image(&backend, "fleet-tmpl-a", clock.epoch_ms());
    clock.advance(Duration::from_millis(800));
    let second = image(&backend, "fleet-tmpl-b", clock.epoch_ms());

    let winner = resolve(&backend, vec![second.clone(), first.clone()], T).await.unwrap();
    assert_eq!(winner.name(), "fleet-tmpl-a");
    assert_eq!(backend.deleted(), vec![second.id().to_string()]);
}

#[test]
fn created_at_renders_rfc3339() {
    let backend = FakeBackend::new(BackendType::Aws);
    let img = image(&backend, "t", FakeClock::START_EPOCH_MS);
    assert_eq!(created_at(&img), "2026-01-01T00:00:00+00:00");
}

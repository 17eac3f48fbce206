// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_adapters::{BackendCall, BackendError, BackendOp, FakeBackend};
use fleet_core::{BackendType, FakeClock, ResourceKind, Tags};

fn heartbeat_writes(backend: &FakeBackend) -> Vec<String> {
    backend
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::SetTags { tags, .. } => tags.get(tags::HEARTBEAT).cloned(),
            _ => None,
        })
        .collect()
}

fn setup() -> (FakeBackend, FakeClock, ResourceRef) {
    let clock = FakeClock::new();
    let backend = FakeBackend::with_clock(BackendType::Aws, clock.clone());
    let target = backend.seed(ResourceKind::Instance, "builder", Tags::new(), clock.epoch_ms());
    (backend, clock, target)
}

#[tokio::test(start_paused = true)]
async fn refreshes_every_period_with_current_time() {
    let (backend, clock, target) = setup();
    let handle = HeartbeatHandle::spawn(
        Arc::new(backend.clone()),
        clock.clone(),
        vec![target.clone()],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    assert!(handle.is_running());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(heartbeat_writes(&backend).is_empty());

    clock.advance(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(heartbeat_writes(&backend), vec![clock.epoch_secs().to_string()]);

    clock.advance(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(heartbeat_writes(&backend).len(), 2);

    handle.stop().await;
    assert!(!handle.is_running());
}

#[tokio::test(start_paused = true)]
async fn no_refresh_after_stop() {
    let (backend, clock, target) = setup();
    let handle = HeartbeatHandle::spawn(
        Arc::new(backend.clone()),
        clock,
        vec![target],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    tokio::time::sleep(Duration::from_secs(61)).await;
    handle.stop().await;
    let before = heartbeat_writes(&backend).len();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(heartbeat_writes(&backend).len(), before);

    // Second stop is a no-op
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_write() {
    let (backend, clock, target) = setup();
    backend.delay(BackendOp::SetTags, Duration::from_secs(10));
    let handle = HeartbeatHandle::spawn(
        Arc::new(backend.clone()),
        clock,
        vec![target],
        Duration::from_secs(60),
        Duration::from_secs(30),
    );

    // Tick fires at 60s; the write is still sleeping at 61s.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(heartbeat_writes(&backend).is_empty());

    let start = tokio::time::Instant::now();
    handle.stop().await;
    assert!(start.elapsed() >= Duration::from_secs(9));
    assert_eq!(heartbeat_writes(&backend).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_failures_do_not_stop_the_loop() {
    let (backend, clock, target) = setup();
    backend.fail_next(BackendOp::SetTags, BackendError::Provider("throttled".into()));
    let handle = HeartbeatHandle::spawn(
        Arc::new(backend.clone()),
        clock,
        vec![target.clone()],
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(heartbeat_writes(&backend).len(), 1);
    assert_eq!(backend.get(&target.id).unwrap().tag(tags::HEARTBEAT), None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(handle.is_running());
    assert_eq!(heartbeat_writes(&backend).len(), 2);
    assert!(backend.get(&target.id).unwrap().tag(tags::HEARTBEAT).is_some());
    handle.stop().await;
}

#[tokio::test]
async fn noop_handle_stops_immediately() {
    let handle = HeartbeatHandle::noop();
    assert!(!handle.is_running());
    handle.stop().await;
}

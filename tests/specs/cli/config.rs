// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet config`

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn defaults_without_a_file() {
    let state = State::empty();
    state
        .fleet()
        .args(&["config", "show"])
        .passes()
        .stdout_has("heartbeat_interval = \"1m\"")
        .stdout_has("stale_after = \"5m\"")
        .stdout_has("wait_timeout = \"30m\"");
}

#[test]
fn file_and_environment_are_merged() {
    let state = State::empty();
    state.config("stale_after = \"10m\"\n");

    let json = state
        .fleet()
        .env("FLEET_POLL_INTERVAL_SECS", "5")
        .args(&["config", "show", "-o", "json"])
        .passes()
        .json();
    assert_eq!(json["stale_after"], "10m");
    assert_eq!(json["poll_interval"], "5s");
    assert_eq!(json["heartbeat_interval"], "1m");
}

#[test]
fn heartbeat_slower_than_staleness_is_rejected() {
    let state = State::empty();
    state.config("heartbeat_interval = \"10m\"\n");
    state
        .fleet()
        .args(&["config", "show"])
        .fails()
        .code(1)
        .stderr_has("must be shorter than stale_after");
}

#[test]
fn unknown_key_is_rejected() {
    let state = State::empty();
    state.config("stale_afterr = \"10m\"\n");
    state.fleet().args(&["config", "show"]).fails().stderr_has("stale_afterr");
}

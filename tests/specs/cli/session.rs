// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet session`

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn list_with_no_sessions() {
    let state = State::empty();
    state.fleet().args(&["session", "list"]).passes().stdout_has("No sessions");
}

#[test]
fn list_shows_keys_and_tokens() {
    let state = State::empty();
    state.session("web-amd64-2", "tok-web").session("agi-amd64-7", "tok-agi");

    let run = state.fleet().args(&["session", "list"]).passes();
    assert_eq!(run.stdout(), "KEY         TOKEN\nagi-amd64-7 tok-agi\nweb-amd64-2 tok-web\n");
}

#[test]
fn list_as_json() {
    let state = State::empty();
    state.session("agi-amd64-7", "tok-agi");

    let json = state.fleet().args(&["session", "list", "-o", "json"]).passes().json();
    assert_eq!(json, serde_json::json!([{ "key": "agi-amd64-7", "token": "tok-agi" }]));
}

#[test]
fn clear_one_key() {
    let state = State::empty();
    state.session("agi-amd64-7", "tok-agi").session("web-amd64-2", "tok-web");

    state
        .fleet()
        .args(&["session", "clear", "agi-amd64-7"])
        .passes()
        .stdout_has("Cleared session agi-amd64-7");
    assert!(!state.sessions().join("agi-amd64-7.session").exists());
    assert!(state.sessions().join("web-amd64-2.session").exists());
}

#[test]
fn clear_all() {
    let state = State::empty();
    state.session("agi-amd64-7", "a").session("web-amd64-2", "b");

    state
        .fleet()
        .args(&["session", "clear", "--all"])
        .passes()
        .stdout_has("Cleared session web-amd64-2");
    state.fleet().args(&["session", "list"]).passes().stdout_has("No sessions");
}

#[test]
fn clear_requires_key_or_all() {
    let state = State::empty();
    state
        .fleet()
        .args(&["session", "clear"])
        .fails()
        .code(2)
        .stderr_has("error: session key required (or use --all)");
}

#[test]
fn invalid_key_is_rejected() {
    let state = State::empty();
    state.fleet().args(&["session", "clear", "../etc/passwd"]).fails().code(2);
}

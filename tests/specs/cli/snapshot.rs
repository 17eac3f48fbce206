// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet snapshot`

use crate::prelude::*;
use crate::prelude::assert_eq;

const TAGS: &str = r#"{
    "fleet.dep.schema": "1",
    "fleet.dep.name": "agi",
    "fleet.dep.instance_type": "r7i.xlarge",
    "fleet.dep.spot": "true",
    "fleet.dep.expire": "30h",
    "fleet.dep.owner": "ops",
    "Name": "agi"
}"#;

#[test]
fn show_inline_tags() {
    let json = cli().args(&["snapshot", "show", TAGS]).passes().json();
    assert_eq!(json["name"], "agi");
    assert_eq!(json["instance_type"], "r7i.xlarge");
    assert_eq!(json["spot"], true);
    assert_eq!(json["expire"], "30h");
}

#[test]
fn show_applies_overrides() {
    let json = cli()
        .args(&["snapshot", "show", TAGS, "--spot", "false"])
        .args(&["--instance-type", "r7i.2xlarge", "--owner", "oncall"])
        .passes()
        .json();
    assert_eq!(json["spot"], false);
    assert_eq!(json["instance_type"], "r7i.2xlarge");
    assert_eq!(json["owner"], "oncall");
    assert_eq!(json["expire"], "30h");
}

#[test]
fn show_reads_file_and_stdin() {
    let state = State::empty();
    let path = state.file("tags.json", TAGS);
    cli().args(&["snapshot", "show", path.to_str().unwrap()]).passes().stdout_has("\"r7i.xlarge\"");
    cli().args(&["snapshot", "show", "-"]).stdin(TAGS).passes().stdout_has("\"r7i.xlarge\"");
}

#[test]
fn show_never_prints_secrets() {
    cli()
        .args(&["snapshot", "show", TAGS])
        .passes()
        .stdout_lacks("secrets")
        .stdout_lacks("local_binary");
}

#[test]
fn missing_required_field_fails() {
    cli()
        .args(&["snapshot", "show", r#"{"fleet.dep.name": "agi"}"#])
        .fails()
        .code(1)
        .stderr_has("error: snapshot is missing required field fleet.dep.instance_type");
}

#[test]
fn inline_array_is_not_a_path() {
    cli()
        .args(&["snapshot", "show", "[1, 2]"])
        .fails()
        .stderr_has("tags must be a JSON object")
        .stderr_lacks("No such file");
}

#[test]
fn malformed_value_names_the_key() {
    let tags = TAGS.replace(r#""fleet.dep.spot": "true""#, r#""fleet.dep.spot": "yes""#);
    cli().args(&["snapshot", "show", &tags]).fails().stderr_has("fleet.dep.spot");
}

#[test]
fn decode_document() {
    let state = State::empty();
    let json =
        br#"{"schema":1,"params":{"name":"agi","instance_type":"r7g.xlarge","arch":"arm64"}}"#;
    let path = state.file("deployment.json.zst", zstd::encode_all(&json[..], 3).unwrap());

    let out = cli().args(&["snapshot", "decode", path.to_str().unwrap()]).passes().json();
    assert_eq!(out["name"], "agi");
    assert_eq!(out["arch"], "arm64");
}

#[test]
fn decode_rejects_newer_schema() {
    let state = State::empty();
    let json = br#"{"schema":99,"params":{"name":"agi","instance_type":"x"}}"#;
    let path = state.file("deployment.json.zst", zstd::encode_all(&json[..], 3).unwrap());

    cli().args(&["snapshot", "decode", path.to_str().unwrap()]).fails().stderr_has("schema 99");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Help and version output

use crate::prelude::*;

#[test]
fn help_lists_command_groups() {
    cli()
        .args(&["--help"])
        .passes()
        .stdout_has("session")
        .stdout_has("snapshot")
        .stdout_has("config");
}

#[test]
fn session_help_shows_subcommands() {
    cli().args(&["session", "--help"]).passes().stdout_has("list").stdout_has("clear");
}

#[test]
fn version_includes_package_version() {
    cli().args(&["--version"]).passes().stdout_has("fleet 0.2");
}

#[test]
fn no_args_is_a_usage_error() {
    cli().fails().code(2).stderr_has("Usage:");
}

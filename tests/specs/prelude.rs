// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for CLI specs.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub use similar_asserts::assert_eq;

/// The `fleet` binary. Built into a private target dir when the current
/// cargo invocation did not build it.
static FLEET_BIN: LazyLock<PathBuf> = LazyLock::new(|| {
    let built = assert_cmd::cargo::cargo_bin("fleet");
    if built.exists() {
        return built;
    }
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let target = root.join("target").join("specs");
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let status = std::process::Command::new(cargo)
        .args(["build", "--quiet", "-p", "fleet", "--bin", "fleet", "--target-dir"])
        .arg(&target)
        .current_dir(root)
        .status()
        .expect("spawn cargo");
    assert!(status.success(), "building fleet failed");
    target.join("debug").join(format!("fleet{}", std::env::consts::EXE_SUFFIX))
});

/// `fleet` with no state directory configured beyond the process default.
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

pub struct CliBuilder {
    cmd: assert_cmd::Command,
}

impl CliBuilder {
    fn new() -> Self {
        let mut cmd = assert_cmd::Command::new(&*FLEET_BIN);
        cmd.env("NO_COLOR", "1");
        for var in [
            "COLOR",
            "FLEET_LOG",
            "RUST_LOG",
            "FLEET_HEARTBEAT_STALE_SECS",
            "FLEET_WAIT_TIMEOUT_SECS",
            "FLEET_POLL_INTERVAL_SECS",
        ] {
            cmd.env_remove(var);
        }
        Self { cmd }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        self.cmd.env(key, value);
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.cmd.write_stdin(input.into());
        self
    }

    pub fn passes(mut self) -> RunAssert {
        RunAssert(self.cmd.assert().success())
    }

    pub fn fails(mut self) -> RunAssert {
        RunAssert(self.cmd.assert().failure())
    }
}

pub struct RunAssert(assert_cmd::assert::Assert);

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.0.get_output().stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.0.get_output().stderr).into_owned()
    }

    pub fn stdout_has(self, needle: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(needle), "stdout missing {needle:?}:\n{stdout}");
        self
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        let stdout = self.stdout();
        assert!(!stdout.contains(needle), "stdout unexpectedly has {needle:?}:\n{stdout}");
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(needle), "stderr missing {needle:?}:\n{stderr}");
        self
    }

    pub fn stderr_lacks(self, needle: &str) -> Self {
        let stderr = self.stderr();
        assert!(!stderr.contains(needle), "stderr unexpectedly has {needle:?}:\n{stderr}");
        self
    }

    pub fn code(self, expected: i32) -> Self {
        assert_eq!(self.0.get_output().status.code(), Some(expected));
        self
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout()).expect("stdout is JSON")
    }
}

/// Isolated state and config directories for one spec.
pub struct State {
    dir: tempfile::TempDir,
}

impl State {
    pub fn empty() -> Self {
        Self { dir: tempfile::tempdir().expect("tempdir") }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn sessions(&self) -> PathBuf {
        self.path().join("state").join("template-sessions")
    }

    /// Store a session token as a coordinator run would.
    pub fn session(&self, key: &str, token: &str) -> &Self {
        std::fs::create_dir_all(self.sessions()).expect("create session dir");
        let path = self.sessions().join(format!("{key}.session"));
        std::fs::write(path, token).expect("write session");
        self
    }

    pub fn file(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, contents).expect("write file");
        path
    }

    pub fn config(&self, toml: &str) -> &Self {
        self.file("config.toml", toml);
        self
    }

    pub fn fleet(&self) -> CliBuilder {
        cli()
            .env("FLEET_STATE_DIR", self.path().join("state"))
            .env("FLEET_CONFIG", self.path().join("config.toml"))
    }
}

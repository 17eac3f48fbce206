// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote execution on provisioned instances (ssh, or `docker exec` locally).

use std::time::Duration;

use async_trait::async_trait;
use fleet_core::ResourceRef;
use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRemote, RemoteCall};

/// Errors from remote operations
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("connect to {target}: {message}")]
    Connect { target: String, message: String },
    #[error("command `{command}` exited {exit_code}: {stderr}")]
    CommandFailed { command: String, exit_code: i32, stderr: String },
    #[error("remote operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("transfer {path}: {message}")]
    Transfer { path: String, message: String },
}

/// Captured output of a command that exited zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn from_stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self { stdout: stdout.into(), stderr: Vec::new() }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Command execution and file transfer against one instance at a time.
///
/// A non-zero exit status surfaces as [`RemoteError::CommandFailed`].
#[async_trait]
pub trait RemoteExec: Send + Sync + 'static {
    async fn exec(
        &self,
        target: &ResourceRef,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ExecOutput, RemoteError>;

    /// Write `contents` to `path` on the target with the given file mode.
    async fn upload(
        &self,
        target: &ResourceRef,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), RemoteError>;

    async fn download(&self, target: &ResourceRef, path: &str) -> Result<Vec<u8>, RemoteError>;
}

/// Wrap a shell snippet as `bash -c <script>`.
pub fn shell(script: impl Into<String>) -> Vec<String> {
    vec!["bash".to_string(), "-c".to_string(), script.into()]
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

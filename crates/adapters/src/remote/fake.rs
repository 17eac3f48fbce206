// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted remote executor for tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::ResourceRef;
use parking_lot::Mutex;

use super::{ExecOutput, RemoteError, RemoteExec};

/// Recorded remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Exec { target: String, command: String },
    Upload { target: String, path: String, mode: u32 },
    Download { target: String, path: String },
}

struct Rule {
    pattern: String,
    transient: VecDeque<RemoteError>,
    response: Result<ExecOutput, RemoteError>,
}

#[derive(Default)]
struct FakeRemoteState {
    rules: Vec<Rule>,
    files: HashMap<(String, String), (Vec<u8>, u32)>,
    upload_faults: Vec<(String, String)>,
    calls: Vec<RemoteCall>,
}

/// Fake remote executor.
///
/// Commands are matched against rules by substring of the space-joined
/// argv; the most recently added matching rule wins. Unmatched commands
/// succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<Mutex<FakeRemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to commands containing `pattern` with `response`.
    pub fn on(&self, pattern: &str, response: Result<ExecOutput, RemoteError>) {
        self.inner.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            transient: VecDeque::new(),
            response,
        });
    }

    /// Fail the first `times` matching commands, then succeed with `stdout`.
    pub fn flaky(&self, pattern: &str, times: usize, error: RemoteError, stdout: &str) {
        self.inner.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            transient: (0..times).map(|_| error.clone()).collect(),
            response: Ok(ExecOutput::from_stdout(stdout)),
        });
    }

    /// Fail uploads whose path contains `pattern`.
    pub fn fail_upload(&self, pattern: &str, message: &str) {
        self.inner.lock().upload_faults.push((pattern.to_string(), message.to_string()));
    }

    /// Place a file on the target, as if provisioned out of band.
    pub fn put_file(&self, target: &ResourceRef, path: &str, contents: &[u8]) {
        self.inner
            .lock()
            .files
            .insert((target.id.clone(), path.to_string()), (contents.to_vec(), 0o644));
    }

    pub fn file(&self, target: &ResourceRef, path: &str) -> Option<(Vec<u8>, u32)> {
        self.inner.lock().files.get(&(target.id.clone(), path.to_string())).cloned()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    /// Joined command lines run against any target, in call order
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Exec { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn exec(
        &self,
        target: &ResourceRef,
        argv: &[String],
        _timeout: Duration,
    ) -> Result<ExecOutput, RemoteError> {
        let command = argv.join(" ");
        let mut state = self.inner.lock();
        state.calls.push(RemoteCall::Exec { target: target.id.clone(), command: command.clone() });
        let Some(rule) = state.rules.iter_mut().rev().find(|r| command.contains(&r.pattern))
        else {
            return Ok(ExecOutput::default());
        };
        match rule.transient.pop_front() {
            Some(err) => Err(err),
            None => rule.response.clone(),
        }
    }

    async fn upload(
        &self,
        target: &ResourceRef,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> Result<(), RemoteError> {
        let mut state = self.inner.lock();
        state.calls.push(RemoteCall::Upload {
            target: target.id.clone(),
            path: path.to_string(),
            mode,
        });
        if let Some((_, message)) = state.upload_faults.iter().find(|(p, _)| path.contains(p)) {
            return Err(RemoteError::Transfer { path: path.to_string(), message: message.clone() });
        }
        state.files.insert((target.id.clone(), path.to_string()), (contents.to_vec(), mode));
        Ok(())
    }

    async fn download(&self, target: &ResourceRef, path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut state = self.inner.lock();
        let key = (target.id.clone(), path.to_string());
        state.calls.push(RemoteCall::Download { target: key.0.clone(), path: key.1.clone() });
        state.files.get(&key).map(|(b, _)| b.clone()).ok_or_else(|| RemoteError::Transfer {
            path: path.to_string(),
            message: "no such file".to_string(),
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded parallel uploads to several instances.

use fleet_adapters::{RemoteError, RemoteExec};
use fleet_core::ResourceRef;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

/// One file to place on an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: String,
    pub contents: Vec<u8>,
    pub mode: u32,
}

impl UploadFile {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into(), contents: contents.into(), mode: 0o644 }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Upload every file to every target, at most `threads` transfers at once.
///
/// All transfers are attempted even after one fails; the first failure (in
/// completion order) is returned.
pub async fn upload_files(
    remote: &dyn RemoteExec,
    targets: &[ResourceRef],
    files: &[UploadFile],
    threads: usize,
) -> Result<(), RemoteError> {
    let pairs: Vec<(&ResourceRef, &UploadFile)> =
        targets.iter().flat_map(|t| files.iter().map(move |f| (t, f))).collect();
    // Futures are lazy; building them up front keeps the closure type out of
    // the stream held across `.await` (works around a rustc Send-inference bug).
    let uploads: Vec<_> =
        pairs.into_iter().map(|(target, file)| upload_one(remote, target, file)).collect();
    let results: Vec<Result<(), RemoteError>> = stream::iter(uploads)
        .buffer_unordered(threads.max(1))
        .collect()
        .await;
    results.into_iter().collect()
}

async fn upload_one(
    remote: &dyn RemoteExec,
    target: &ResourceRef,
    file: &UploadFile,
) -> Result<(), RemoteError> {
    debug!(target = %target.id, path = %file.path, bytes = file.contents.len(), "uploading");
    remote.upload(target, &file.path, &file.contents, file.mode).await.inspect_err(|e| {
        warn!(target = %target.id, path = %file.path, error = %e, "upload failed");
    })
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;

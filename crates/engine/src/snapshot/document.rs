// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compressed on-instance copy of the deployment parameters.

use serde::{Deserialize, Serialize};

use super::{DeploymentParams, SnapshotError, SCHEMA_VERSION};

pub const DOCUMENT_NAME: &str = "deployment.json.zst";

const ZSTD_LEVEL: i32 = 3;

#[derive(Serialize, Deserialize)]
struct Document {
    schema: u32,
    params: DeploymentParams,
}

/// Where the document lives under a deployment's mount point.
pub fn document_path(mount: &str) -> String {
    format!("{}/{DOCUMENT_NAME}", mount.trim_end_matches('/'))
}

/// Serialize (secrets stripped) and compress.
pub fn encode_document(params: &DeploymentParams) -> Result<Vec<u8>, SnapshotError> {
    let doc = Document { schema: SCHEMA_VERSION, params: params.without_secrets() };
    let json = serde_json::to_vec(&doc)?;
    Ok(zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?)
}

pub fn decode_document(bytes: &[u8]) -> Result<DeploymentParams, SnapshotError> {
    let json = zstd::decode_all(bytes)?;
    let doc: Document = serde_json::from_slice(&json)?;
    if doc.schema > SCHEMA_VERSION {
        return Err(SnapshotError::UnsupportedSchema(doc.schema));
    }
    Ok(doc.params)
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;

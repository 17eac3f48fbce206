// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable deployment config snapshots.
//!
//! A deployment's creation parameters are flattened into tags on its
//! persistent volume, so the volume alone is enough to rebuild the
//! deployment after its instance is gone. The tag set is a versioned
//! schema: every key lives under [`keys::PREFIX`], unknown keys are
//! ignored, and [`keys::SCHEMA`] records the layout version.
//!
//! A compressed JSON copy ([`encode_document`]) is also written onto the
//! instance for on-box inspection. The tag copy is authoritative.

mod document;

pub use document::{decode_document, document_path, encode_document, DOCUMENT_NAME};

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use fleet_core::time_fmt::serde_duration;
use fleet_core::{format_duration, parse_duration, BackendType, Tags};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag keys of the snapshot schema
pub mod keys {
    pub const PREFIX: &str = "fleet.dep.";
    pub const SCHEMA: &str = "fleet.dep.schema";
    pub const NAME: &str = "fleet.dep.name";
    pub const OWNER: &str = "fleet.dep.owner";
    pub const LABEL: &str = "fleet.dep.label";
    pub const VERSION: &str = "fleet.dep.version";
    pub const INSTANCE_TYPE: &str = "fleet.dep.instance_type";
    pub const ARCH: &str = "fleet.dep.arch";
    pub const SPOT: &str = "fleet.dep.spot";
    pub const SPOT_FALLBACK: &str = "fleet.dep.spot_fallback";
    pub const TERMINATE_ON_POWEROFF: &str = "fleet.dep.term_on_poweroff";
    pub const NO_DIM: &str = "fleet.dep.no_dim";
    pub const FIPS: &str = "fleet.dep.fips";
    pub const DISABLE_PUBLIC_IP: &str = "fleet.dep.disable_public_ip";
    pub const SSL_DISABLE: &str = "fleet.dep.ssl_disable";
    pub const PLACEMENT: &str = "fleet.dep.placement";
    pub const FIREWALL: &str = "fleet.dep.firewall";
    pub const TEMPLATE: &str = "fleet.dep.template";
    pub const EXPIRE: &str = "fleet.dep.expire";
    pub const VOLUME_EXPIRE: &str = "fleet.dep.volume_expire";
    pub const VOLUME_SIZE: &str = "fleet.dep.volume_size";
    pub const DNS_ZONE_ID: &str = "fleet.dep.dns_zone_id";
    pub const DNS_DOMAIN: &str = "fleet.dep.dns_domain";
    pub const MONITOR_URL: &str = "fleet.dep.monitor_url";
    pub const MONITOR_CERT_IGNORE: &str = "fleet.dep.monitor_cert_ignore";
    pub const SRC_LOCAL: &str = "fleet.dep.src_local";
    pub const SRC_SFTP: &str = "fleet.dep.src_sftp";
    pub const SRC_S3: &str = "fleet.dep.src_s3";

    /// Every key the current schema writes
    pub const ALL: &[&str] = &[
        SCHEMA, NAME, OWNER, LABEL, VERSION, INSTANCE_TYPE, ARCH, SPOT, SPOT_FALLBACK,
        TERMINATE_ON_POWEROFF, NO_DIM, FIPS, DISABLE_PUBLIC_IP, SSL_DISABLE, PLACEMENT, FIREWALL,
        TEMPLATE, EXPIRE, VOLUME_EXPIRE, VOLUME_SIZE, DNS_ZONE_ID, DNS_DOMAIN, MONITOR_URL,
        MONITOR_CERT_IGNORE, SRC_LOCAL, SRC_SFTP, SRC_S3,
    ];
}

/// Current snapshot layout version
pub const SCHEMA_VERSION: u32 = 1;

/// Longest free-text value kept in a tag, in bytes before base64. Encoded,
/// it stays within the 255 character provider limit on tag values.
pub const MAX_TEXT_BYTES: usize = 191;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is missing required field {0}")]
    MissingField(&'static str),
    #[error("snapshot field {key} has invalid value {value:?}: {reason}")]
    InvalidField { key: String, value: String, reason: String },
    #[error("deployment document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("deployment document compression: {0}")]
    Compression(#[from] std::io::Error),
    #[error("deployment document schema {0} is newer than this tool supports")]
    UnsupportedSchema(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    Amd64,
    Arm64,
}

impl Arch {
    /// Instance type used when the caller does not pick one.
    pub fn default_instance_type(self, backend: BackendType) -> &'static str {
        match (backend, self) {
            (BackendType::Aws, Arch::Amd64) => "r7i.xlarge",
            (BackendType::Aws, Arch::Arm64) => "r7g.xlarge",
            (BackendType::Gcp, Arch::Amd64) => "c2d-highmem-4",
            (BackendType::Gcp, Arch::Arm64) => "c4a-highmem-4",
            (BackendType::Docker, _) => "container",
        }
    }
}

fleet_core::simple_display! {
    Arch {
        Amd64 => "amd64",
        Arm64 => "arm64",
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" | "x86_64" => Ok(Arch::Amd64),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(format!("unknown architecture {other:?}")),
        }
    }
}

/// Free-text descriptions of where the deployment pulls its input from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sources {
    #[serde(default)]
    pub local: String,
    #[serde(default)]
    pub sftp: String,
    #[serde(default)]
    pub s3: String,
}

/// Credentials the deployment needs at creation time. Never snapshotted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub sftp_password: String,
    pub s3_secret: String,
    pub notify_token: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Secrets")
            .field("sftp_password", &mask(&self.sftp_password))
            .field("s3_secret", &mask(&self.s3_secret))
            .field("notify_token", &mask(&self.notify_token))
            .finish()
    }
}

/// Everything needed to (re)create a volume-backed deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParams {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub software_version: String,
    pub instance_type: String,
    #[serde(default)]
    pub arch: Arch,
    #[serde(default)]
    pub spot: bool,
    #[serde(default)]
    pub spot_fallback: bool,
    #[serde(default)]
    pub terminate_on_poweroff: bool,
    #[serde(default)]
    pub no_dim: bool,
    #[serde(default)]
    pub fips: bool,
    #[serde(default)]
    pub disable_public_ip: bool,
    #[serde(default)]
    pub ssl_disable: bool,
    /// Subnet, zone or other provider placement hint
    #[serde(default)]
    pub placement: String,
    #[serde(default)]
    pub firewall: String,
    /// Template image the instance boots from (resolved name)
    #[serde(default)]
    pub template: String,
    /// Instance lifetime; zero means no expiry
    #[serde(with = "serde_duration", default)]
    pub expire: Duration,
    #[serde(with = "serde_duration", default)]
    pub volume_expire: Duration,
    #[serde(default)]
    pub volume_size_gib: Option<u32>,
    #[serde(default)]
    pub dns_zone_id: String,
    #[serde(default)]
    pub dns_domain: String,
    #[serde(default)]
    pub monitor_url: String,
    #[serde(default)]
    pub monitor_cert_ignore: bool,
    #[serde(default)]
    pub sources: Sources,
    #[serde(skip)]
    pub secrets: Secrets,
    /// Locally built binary to upload; a path on the invoking host only
    #[serde(skip)]
    pub local_binary: Option<PathBuf>,
}

impl DeploymentParams {
    pub fn new(name: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self { name: name.into(), instance_type: instance_type.into(), ..Default::default() }
    }

    pub fn has_dns(&self) -> bool {
        !self.dns_zone_id.is_empty() && !self.dns_domain.is_empty()
    }

    /// Copy with secrets and host-local paths removed.
    pub fn without_secrets(&self) -> Self {
        Self { secrets: Secrets::default(), local_binary: None, ..self.clone() }
    }
}

/// Caller-supplied values that win over the snapshot, field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub instance_type: Option<String>,
    pub spot: Option<bool>,
    pub no_dim: Option<bool>,
    pub owner: Option<String>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, params: &mut DeploymentParams) {
        if let Some(t) = &self.instance_type {
            params.instance_type = t.clone();
        }
        if let Some(spot) = self.spot {
            params.spot = spot;
        }
        if let Some(no_dim) = self.no_dim {
            params.no_dim = no_dim;
        }
        if let Some(owner) = &self.owner {
            params.owner = owner.clone();
        }
    }
}

/// Flatten params into snapshot tags. Empty strings are omitted; secrets and
/// local paths are never written.
pub fn snapshot(params: &DeploymentParams) -> Tags {
    let mut tags = Tags::new();
    let mut put = |key: &str, value: String| {
        if !value.is_empty() {
            tags.insert(key.to_string(), value);
        }
    };

    put(keys::SCHEMA, SCHEMA_VERSION.to_string());
    put(keys::NAME, params.name.clone());
    put(keys::OWNER, params.owner.clone());
    put(keys::LABEL, encode_text(&truncate_text(&params.label)));
    put(keys::VERSION, params.software_version.clone());
    put(keys::INSTANCE_TYPE, params.instance_type.clone());
    put(keys::ARCH, params.arch.to_string());
    put(keys::SPOT, params.spot.to_string());
    put(keys::SPOT_FALLBACK, params.spot_fallback.to_string());
    put(keys::TERMINATE_ON_POWEROFF, params.terminate_on_poweroff.to_string());
    put(keys::NO_DIM, params.no_dim.to_string());
    put(keys::FIPS, params.fips.to_string());
    put(keys::DISABLE_PUBLIC_IP, params.disable_public_ip.to_string());
    put(keys::SSL_DISABLE, params.ssl_disable.to_string());
    put(keys::PLACEMENT, params.placement.clone());
    put(keys::FIREWALL, params.firewall.clone());
    put(keys::TEMPLATE, params.template.clone());
    put(keys::EXPIRE, format_duration(params.expire));
    put(keys::VOLUME_EXPIRE, format_duration(params.volume_expire));
    put(keys::VOLUME_SIZE, params.volume_size_gib.map(|s| s.to_string()).unwrap_or_default());
    put(keys::DNS_ZONE_ID, params.dns_zone_id.clone());
    put(keys::DNS_DOMAIN, params.dns_domain.clone());
    put(keys::MONITOR_URL, params.monitor_url.clone());
    put(keys::MONITOR_CERT_IGNORE, params.monitor_cert_ignore.to_string());
    put(keys::SRC_LOCAL, encode_text(&truncate_text(&params.sources.local)));
    put(keys::SRC_SFTP, encode_text(&truncate_text(&params.sources.sftp)));
    put(keys::SRC_S3, encode_text(&truncate_text(&params.sources.s3)));
    tags
}

/// [`snapshot`] plus a blank value for every key it omitted.
///
/// Tag writes merge, so writing this map in one call replaces whatever
/// snapshot the volume carried before; blank values read back as absent.
pub fn tag_update(params: &DeploymentParams) -> Tags {
    let mut tags = snapshot(params);
    for key in keys::ALL {
        tags.entry((*key).to_string()).or_default();
    }
    tags
}

/// Rebuild params from snapshot tags, then apply `overrides`.
///
/// Name and instance type are required: reconstruction never guesses
/// billable sizing.
pub fn reconstruct(tags: &Tags, overrides: &Overrides) -> Result<DeploymentParams, SnapshotError> {
    let reader = Reader(tags);

    if let Some(schema) = reader.number::<u32>(keys::SCHEMA)? {
        if schema > SCHEMA_VERSION {
            tracing::warn!(
                schema,
                supported = SCHEMA_VERSION,
                "snapshot schema is newer, reading best-effort"
            );
        }
    }

    let mut params = DeploymentParams {
        name: reader.required(keys::NAME)?,
        owner: reader.text(keys::OWNER),
        label: reader.encoded(keys::LABEL)?,
        software_version: reader.text(keys::VERSION),
        instance_type: String::new(),
        arch: reader.arch(keys::ARCH)?,
        spot: reader.flag(keys::SPOT)?,
        spot_fallback: reader.flag(keys::SPOT_FALLBACK)?,
        terminate_on_poweroff: reader.flag(keys::TERMINATE_ON_POWEROFF)?,
        no_dim: reader.flag(keys::NO_DIM)?,
        fips: reader.flag(keys::FIPS)?,
        disable_public_ip: reader.flag(keys::DISABLE_PUBLIC_IP)?,
        ssl_disable: reader.flag(keys::SSL_DISABLE)?,
        placement: reader.text(keys::PLACEMENT),
        firewall: reader.text(keys::FIREWALL),
        template: reader.text(keys::TEMPLATE),
        expire: reader.duration(keys::EXPIRE)?,
        volume_expire: reader.duration(keys::VOLUME_EXPIRE)?,
        volume_size_gib: reader.number(keys::VOLUME_SIZE)?,
        dns_zone_id: reader.text(keys::DNS_ZONE_ID),
        dns_domain: reader.text(keys::DNS_DOMAIN),
        monitor_url: reader.text(keys::MONITOR_URL),
        monitor_cert_ignore: reader.flag(keys::MONITOR_CERT_IGNORE)?,
        sources: Sources {
            local: reader.encoded(keys::SRC_LOCAL)?,
            sftp: reader.encoded(keys::SRC_SFTP)?,
            s3: reader.encoded(keys::SRC_S3)?,
        },
        secrets: Secrets::default(),
        local_binary: None,
    };

    overrides.apply(&mut params);
    if params.instance_type.is_empty() {
        params.instance_type = reader.required(keys::INSTANCE_TYPE)?;
    }
    Ok(params)
}

fn encode_text(s: &str) -> String {
    STANDARD_NO_PAD.encode(s.as_bytes())
}

/// Cut `s` to [`MAX_TEXT_BYTES`] on a char boundary, marking the cut with `...`.
fn truncate_text(s: &str) -> Cow<'_, str> {
    if s.len() <= MAX_TEXT_BYTES {
        return Cow::Borrowed(s);
    }
    let mut end = MAX_TEXT_BYTES - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}...", &s[..end]))
}

struct Reader<'a>(&'a Tags);

impl Reader<'_> {
    fn raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn text(&self, key: &str) -> String {
        self.raw(key).unwrap_or_default().to_string()
    }

    fn required(&self, key: &'static str) -> Result<String, SnapshotError> {
        self.raw(key).map(str::to_string).ok_or(SnapshotError::MissingField(key))
    }

    fn invalid(key: &str, value: &str, reason: impl fmt::Display) -> SnapshotError {
        SnapshotError::InvalidField {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, SnapshotError> {
        match self.raw(key) {
            None => Ok(false),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(Self::invalid(key, other, "expected true or false")),
        }
    }

    fn duration(&self, key: &str) -> Result<Duration, SnapshotError> {
        match self.raw(key) {
            None => Ok(Duration::ZERO),
            Some(v) => parse_duration(v).map_err(|e| Self::invalid(key, v, e)),
        }
    }

    fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, SnapshotError>
    where
        T::Err: fmt::Display,
    {
        match self.raw(key) {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|e| Self::invalid(key, v, e)),
        }
    }

    fn arch(&self, key: &str) -> Result<Arch, SnapshotError> {
        match self.raw(key) {
            None => Ok(Arch::default()),
            Some(v) => v.parse().map_err(|e| Self::invalid(key, v, e)),
        }
    }

    fn encoded(&self, key: &str) -> Result<String, SnapshotError> {
        let Some(v) = self.raw(key) else {
            return Ok(String::new());
        };
        let bytes = STANDARD_NO_PAD.decode(v).map_err(|e| Self::invalid(key, v, e))?;
        String::from_utf8(bytes).map_err(|e| Self::invalid(key, v, e))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet snapshot` - inspect deployment config snapshots

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use fleet_core::Tags;
use fleet_engine::{decode_document, reconstruct, DeploymentParams, Overrides};

#[derive(Args)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Rebuild deployment parameters from a volume's tags
    Show {
        /// Tags as a JSON object: inline, a file path, or `-` for stdin
        tags: String,
        #[arg(long)]
        instance_type: Option<String>,
        #[arg(long)]
        spot: Option<bool>,
        #[arg(long)]
        no_dim: Option<bool>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Decode an on-instance deployment document
    Decode {
        /// Path to deployment.json.zst
        file: PathBuf,
    },
}

pub fn handle(command: SnapshotCommand) -> Result<()> {
    let params = match command {
        SnapshotCommand::Show { tags, instance_type, spot, no_dim, owner } => {
            let overrides = Overrides { instance_type, spot, no_dim, owner };
            show(&read_tags(&tags)?, &overrides)?
        }
        SnapshotCommand::Decode { file } => decode(&file)?,
    };
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

pub(crate) fn show(tags: &Tags, overrides: &Overrides) -> Result<DeploymentParams> {
    Ok(reconstruct(tags, overrides)?)
}

pub(crate) fn decode(file: &Path) -> Result<DeploymentParams> {
    let bytes = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
    Ok(decode_document(&bytes)?)
}

/// Parse the tags argument. Values must be strings, as tag stores hold them.
pub(crate) fn read_tags(arg: &str) -> Result<Tags> {
    let inline = arg.trim_start();
    let text = if arg == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("read tags from stdin")?;
        text
    } else if inline.starts_with('{') || inline.starts_with('[') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("read {arg}"))?
    };
    serde_json::from_str(&text).context("tags must be a JSON object of string values")
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet session` - local template-build session tokens

use anyhow::Result;
use clap::{Args, Subcommand};
use fleet_adapters::SessionStore;
use fleet_core::VersionKey;
use serde::Serialize;

use crate::exit_error::ExitError;
use crate::output::{handle_list, write_table, OutputFormat};

#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List version keys with a stored session token
    List,
    /// Forget the session token for a version key
    Clear {
        /// Version key, e.g. agi-amd64-7
        key: Option<VersionKey>,
        /// Clear every stored token
        #[arg(long, conflicts_with = "key")]
        all: bool,
    },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SessionEntry {
    pub key: String,
    pub token: String,
}

pub fn handle(
    command: SessionCommand,
    store: &dyn SessionStore,
    format: OutputFormat,
) -> Result<()> {
    match command {
        SessionCommand::List => {
            let entries = entries(store)?;
            handle_list(format, &entries, "No sessions", |entries, out| {
                let rows: Vec<Vec<String>> =
                    entries.iter().map(|e| vec![e.key.clone(), e.token.clone()]).collect();
                write_table(out, &["KEY", "TOKEN"], &rows)
            })
        }
        SessionCommand::Clear { key, all } => {
            let cleared = clear(store, key, all)?;
            if cleared.is_empty() {
                println!("No sessions to clear");
            }
            for key in cleared {
                println!("Cleared session {key}");
            }
            Ok(())
        }
    }
}

pub(crate) fn entries(store: &dyn SessionStore) -> Result<Vec<SessionEntry>> {
    let mut entries = Vec::new();
    for key in store.list()? {
        if let Some(token) = store.load(&key)? {
            entries.push(SessionEntry { key: key.to_string(), token: token.to_string() });
        }
    }
    Ok(entries)
}

/// Clear one key or all of them. Returns the keys that were cleared.
pub(crate) fn clear(
    store: &dyn SessionStore,
    key: Option<VersionKey>,
    all: bool,
) -> Result<Vec<VersionKey>> {
    let keys = match (key, all) {
        (Some(key), false) => {
            if store.load(&key)?.is_none() {
                return Ok(Vec::new());
            }
            vec![key]
        }
        (None, true) => store.list()?,
        _ => return Err(ExitError::usage("session key required (or use --all)").into()),
    };
    for key in &keys {
        store.clear(key)?;
        tracing::debug!(key = %key, "session cleared");
    }
    Ok(keys)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

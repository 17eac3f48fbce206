// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet: maintenance commands for the provisioning coordinator.

mod color;
mod commands;
mod exit_error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fleet_adapters::FileSessionStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use commands::{config, session, snapshot};
use output::OutputFormat;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_GIT_HASH"), ")");

#[derive(Parser)]
#[command(name = "fleet", version = VERSION, styles = color::styles())]
#[command(about = "Provisioning coordinator maintenance")]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Local template-build session tokens
    Session(session::SessionArgs),
    /// Inspect deployment config snapshots
    Snapshot(snapshot::SnapshotArgs),
    /// Coordinator configuration
    Config(config::ConfigArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(exit_error::exit_code(&e));
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Session(args) => {
            let store = FileSessionStore::new(fleet_engine::env::session_dir()?);
            session::handle(args.command, &store, cli.format)
        }
        Commands::Snapshot(args) => snapshot::handle(args.command),
        Commands::Config(args) => config::handle(args.command, cli.format),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
///
/// Filter: `FLEET_LOG`, then `RUST_LOG`, then `warn` (`debug` with `-v`).
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("FLEET_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

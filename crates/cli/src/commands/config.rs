// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet config` - coordinator configuration

use anyhow::Result;
use clap::{Args, Subcommand};
use fleet_engine::CoordinatorConfig;

use crate::output::{format_or_json, OutputFormat};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (file plus environment overrides)
    Show,
}

pub fn handle(command: ConfigCommand, format: OutputFormat) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = CoordinatorConfig::load()?;
            format_or_json(format, &config, || {
                print!("{}", config.to_toml()?);
                Ok(())
            })
        }
    }
}

//! Command line definition

use clap::{Parser, Subcommand};
use shepherd_core::ShepherdConfig;
use std::path::PathBuf;

/// Shepherd entity edit-state harness
#[derive(Debug, Parser)]
#[command(name = "shepherd", version, about)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Run an order aggregate through create, edit, save and reload
    Simulate {
        /// Lines created on the order
        #[arg(long, default_value_t = 3)]
        lines: usize,
        /// Fail the first commit and retry it
        #[arg(long)]
        fail_first: bool,
    },
    /// Dispatch concurrent increments through the entity store
    Stress {
        /// Entities tracked
        #[arg(long, default_value_t = 100)]
        entities: usize,
        /// Increments per entity
        #[arg(long, default_value_t = 100)]
        mutations: usize,
    },
    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Load the configuration named by `--config`, or the defaults
    ///
    /// # Errors
    /// Fails if the file cannot be read, parsed or validated.
    pub fn load_config(&self) -> anyhow::Result<ShepherdConfig> {
        let config = match &self.config {
            Some(path) => ShepherdConfig::load(path)?,
            None => ShepherdConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

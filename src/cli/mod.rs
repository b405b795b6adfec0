//! Command-line interface.
//!
//! The CLI is a thin shell over the library: it loads templates, states and
//! configuration from disk and prints what the engine reports. It never
//! applies changes.
//!
//! ```bash
//! # What would change?
//! stackwright plan --template stack.yaml --state state.json -p Env=prod
//!
//! # In which order would resources be reconciled?
//! stackwright graph --template stack.yaml --improved
//!
//! # Are the template and parameters valid?
//! stackwright validate --template stack.yaml -p Env=prod
//! ```
//!
//! Global options: `--verbose` enables debug logging, `--quiet` limits output
//! to errors, and `--config` names an engine configuration file other than
//! `~/.stackwright/config.toml`. `RUST_LOG` overrides the log level.

pub mod common;
pub mod graph;
pub mod plan;
pub mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EngineConfig;

/// Declarative stack reconciliation.
#[derive(Parser, Debug)]
#[command(
    name = "stackwright",
    about = "Plan and inspect declarative infrastructure stacks",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Engine configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show what an update would change
    Plan(plan::PlanCommand),

    /// Show dependency levels
    Graph(graph::GraphCommand),

    /// Validate a template and its parameters
    Validate(validate::ValidateCommand),
}

impl Cli {
    /// The default log filter implied by `--verbose` / `--quiet`.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Load configuration and run the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = EngineConfig::load_with_optional(self.config).await?;

        match self.command {
            Commands::Plan(cmd) => cmd.execute(&config).await,
            Commands::Graph(cmd) => cmd.execute().await,
            Commands::Validate(cmd) => cmd.execute(&config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_flags() {
        let cli = Cli::parse_from(["stackwright", "graph", "--template", "t.yaml"]);
        assert_eq!(cli.log_level(), "info");
        let cli = Cli::parse_from(["stackwright", "-v", "graph", "--template", "t.yaml"]);
        assert_eq!(cli.log_level(), "debug");
        let cli = Cli::parse_from(["stackwright", "graph", "--template", "t.yaml", "--quiet"]);
        assert_eq!(cli.log_level(), "error");
        assert!(Cli::try_parse_from(["stackwright", "-v", "-q", "graph", "-t", "t.yaml"]).is_err());
    }

    #[test]
    fn test_repeated_parameters() {
        let cli = Cli::parse_from([
            "stackwright",
            "plan",
            "--template",
            "t.yaml",
            "-p",
            "Env=prod",
            "--parameter",
            "Size=large",
        ]);
        match cli.command {
            Commands::Plan(cmd) => assert_eq!(cmd.parameters.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

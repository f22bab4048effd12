//! Command-line interface for the kiln worker.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface for the kiln worker.
#[derive(Parser)]
#[command(name = "kilnw")]
#[command(about = "kiln worker - build a project checkout and ship its output")]
pub struct Cli {
    /// Path to an optional settings file
    #[arg(short, long, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    /// What to do. Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the kiln worker.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Build the project, stream its logs and upload the output
    Run,
    /// Resolve and display the configuration without building
    Parse,
}

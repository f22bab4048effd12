//! kiln worker (kilnw)
//!
//! Builds one project checkout and deploys what the build produced:
//!
//! - **Build**: runs the build command in the checkout, streaming every line
//!   of its output to the `logs:{project_id}` pub/sub topic as it arrives
//! - **Upload**: puts every file of the output directory into object storage
//!   under `__outputs/{project_id}/`, reporting each file on the same topic
//!
//! A failed upload is reported and skipped. The process exits non-zero only
//! when the build can't be started, is cancelled or times out, or when the
//! output directory is missing.

mod cli;
mod commands;
mod error;
mod job;
mod orchestrator;
mod prelude;
mod upload;

use clap::Parser;
use cli::{Cli, Commands};
use kiln_config::{WorkerConfig, WorkerSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{handle_parse, handle_run};
use crate::prelude::*;

/// Main entry point for the kiln worker.
///
/// Initializes logging, resolves the configuration from the optional
/// settings file and the environment, and dispatches to the command handler.
///
/// # Examples
///
/// ```bash
/// # Build and deploy with settings from the environment
/// PROJECT_ID=proj123 REDIS_URL=redis://localhost:6379 AWS_REGION=ap-south-1 \
///     AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=... kilnw run
///
/// # Show what would be used
/// kilnw --config kiln.toml parse
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "kilnw=info,kiln_config=info,kiln_io=info,kiln_logs=info,kiln_storage=info"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => WorkerSettings::from_file(path)?,
        None => WorkerSettings::default(),
    };
    let config = WorkerConfig::from_env(settings)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Parse => handle_parse(&config),
        Commands::Run => handle_run(config).await,
    }
}

//! # review-swarm CLI
//!
//! Entry point for the review-swarm command-line tool: parallel multi-agent
//! code review with cross-pass finding deduplication.
//!
//! ## Usage
//!
//! ```bash
//! review-swarm review owner/repo --passes 3
//! review-swarm review ./src --agent security
//! review-swarm init
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use review_swarm::cli::{run_init, run_review, Cli, Commands};
use review_swarm::{Config, ReviewError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("review_swarm={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|_| ReviewError::LoggingSetup)?;

    info!("review-swarm starting");

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            if cli.config.exists() {
                return Err(err);
            }
            if !cli.quiet {
                tracing::warn!(
                    "no configuration file found at {}, using defaults",
                    cli.config.display()
                );
            }
            Config::default()
        }
    };

    match cli.command {
        Commands::Review(args) => {
            run_review(args, config).await?;
        }
        Commands::Init(args) => {
            run_init(args).await?;
        }
    }

    info!("review-swarm completed");
    Ok(())
}

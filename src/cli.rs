//! # CLI Definitions
//!
//! Flag parsing and the thin command front-ends. The engine itself lives in
//! [`crate::orchestrator`]; this layer only wires configuration, resolves
//! credentials, and decides the process exit code.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::github;
use crate::llm::SubprocessLlmClient;
use crate::orchestrator::Orchestrator;
use crate::types::{ReviewRequest, ReviewTarget};

#[derive(Parser)]
#[command(name = "review-swarm", version, about)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "review-swarm.toml")]
    pub config: PathBuf,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured review agents against a target
    Review(ReviewArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

#[derive(clap::Args)]
pub struct ReviewArgs {
    /// Review target: `owner/repo` or a local directory
    pub target: String,

    /// Review passes per agent (overrides the config)
    #[arg(long)]
    pub passes: Option<usize>,

    /// Only run the named agents (repeatable)
    #[arg(long = "agent")]
    pub agents: Vec<String>,

    /// Extra instruction passed to every agent (repeatable)
    #[arg(long = "instruction")]
    pub instructions: Vec<String>,

    /// GitHub token; falls back to the config, then the gh CLI
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(clap::Args)]
pub struct InitArgs {
    /// Where to write the configuration
    #[arg(long, default_value = "review-swarm.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// `review` command: resolve the target and token, build the request, run
/// the orchestrator, print per-agent output.
pub async fn run_review(args: ReviewArgs, config: Config) -> anyhow::Result<()> {
    let target = ReviewTarget::parse(&args.target)?;

    let mut agents = config.agents.clone();
    if !args.agents.is_empty() {
        agents.retain(|a| args.agents.iter().any(|name| *name == a.name));
        let missing: Vec<&String> = args
            .agents
            .iter()
            .filter(|name| !agents.iter().any(|a| a.name == **name))
            .collect();
        if !missing.is_empty() {
            bail!("unknown agents requested: {missing:?}");
        }
    }
    if agents.is_empty() {
        bail!("no review agents configured; add [[agents]] entries to the config");
    }

    let token = if target.is_local() {
        None
    } else {
        let provided = args.token.as_deref().or(Some(config.github.token.as_str()));
        let timeout = Duration::from_secs(config.github.auth_timeout_seconds);
        let token = github::resolve_token(provided, timeout).await;
        if token.is_none() {
            warn!("no GitHub token available; the backend may hit rate limits");
        }
        token
    };

    let passes = args.passes.unwrap_or(config.orchestrator.review_passes);
    let request = ReviewRequest {
        target,
        agents,
        passes,
        token,
        instructions: args.instructions,
    };

    let client = Arc::new(SubprocessLlmClient::new(config.llm.clone()));
    let orchestrator = Orchestrator::new(config, client);
    let (results, summary) = orchestrator.execute_reviews(request).await?;

    for result in &results {
        println!("\n===== {} =====\n", result.agent_display_name);
        match (&result.content, &result.error_message) {
            (Some(content), _) if result.success => println!("{content}"),
            (_, Some(error)) => println!("review failed: {error}"),
            _ => println!("review produced no output"),
        }
    }

    info!(
        agents = summary.agents,
        succeeded = summary.passes_succeeded,
        failed = summary.passes_failed,
        "run completed in {:.1}s",
        summary.wall_time.as_secs_f64()
    );

    if summary.passes_succeeded == 0 {
        bail!("every review pass failed");
    }
    Ok(())
}

/// `init` command: write the default configuration.
pub async fn run_init(args: InitArgs) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.path.display()
        );
    }
    let rendered = toml::to_string_pretty(&Config::default())
        .context("failed to serialize default configuration")?;
    tokio::fs::write(&args.path, rendered)
        .await
        .with_context(|| format!("failed to write {}", args.path.display()))?;
    println!("wrote {}", args.path.display());
    Ok(())
}

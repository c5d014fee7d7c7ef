//! # Review Orchestrator
//!
//! Structured-concurrency driver: one task per agent bounded by a counting
//! semaphore, K sequential passes per task, three nested deadlines, atomic
//! checkpointing, and per-agent deduplication of multi-pass results.

pub mod agent;
pub mod checkpoint;
pub mod context;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::collector::collect_sources;
use crate::config::Config;
use crate::dedup::aggregate_agent_results;
use crate::error::Result;
use crate::llm::{LlmClient, McpServerMap};
use crate::resilience::{CircuitBreaker, RetryConfig, RetryExecutor, SystemClock};
use crate::types::{AgentConfig, ReviewRequest, ReviewResult, RunSummary, SourceBundle};

use agent::ReviewAgent;
use checkpoint::write_checkpoint;
use context::ReviewContext;

pub use context::build_review_prompt;

/// Drives one review run end to end.
pub struct Orchestrator {
    config: Config,
    client: Arc<dyn LlmClient>,
}

impl Orchestrator {
    pub fn new(config: Config, client: Arc<dyn LlmClient>) -> Self {
        Self { config, client }
    }

    /// Execute all agents against the target.
    ///
    /// Every `(agent, pass)` slot is represented in the output no matter
    /// how it ended; a single agent's failure never aborts the run.
    pub async fn execute_reviews(
        &self,
        request: ReviewRequest,
    ) -> Result<(Vec<ReviewResult>, RunSummary)> {
        let started = Instant::now();
        let passes = request.passes.max(1);
        let target_display = request.target.display_name();
        let orchestrator_cfg = &self.config.orchestrator;

        let source_bundle = match &request.target {
            crate::types::ReviewTarget::Local { directory } => {
                let bundle = collect_sources(directory, &self.config.local_files)?;
                info!(
                    files = bundle.file_count,
                    "collected local sources for review"
                );
                Arc::new(bundle)
            }
            _ => Arc::new(SourceBundle::empty()),
        };

        let context = Arc::new(ReviewContext {
            client: Arc::clone(&self.client),
            pass_timeout: Duration::from_secs(orchestrator_cfg.agent_timeout_minutes * 60),
            idle_timeout: Duration::from_secs(orchestrator_cfg.idle_timeout_minutes * 60),
            max_retries: orchestrator_cfg.max_retries,
            user_instructions: request.instructions.clone(),
            reasoning_effort: self.config.llm.reasoning_effort.clone(),
            retry: self.review_retry_executor(),
            mcp_servers: Arc::new(build_mcp_servers(&request)),
            source_bundle,
        });

        let semaphore = Arc::new(Semaphore::new(orchestrator_cfg.parallelism));
        let checkpoint_dir = orchestrator_cfg.checkpoint_directory.clone();
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(orchestrator_cfg.orchestrator_timeout_minutes * 60);

        let mut tasks = Vec::with_capacity(request.agents.len());
        for agent_config in &request.agents {
            let handle = tokio::spawn(run_agent_task(
                agent_config.clone(),
                request.target.clone(),
                Arc::clone(&context),
                Arc::clone(&semaphore),
                passes,
                checkpoint_dir.clone(),
            ));
            let abort = handle.abort_handle();
            tasks.push((agent_config.clone(), abort, handle));
        }

        let mut all_results = Vec::with_capacity(request.agents.len() * passes);
        for (agent_config, abort, handle) in tasks {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(results)) => all_results.extend(results),
                Ok(Err(join_error)) => {
                    warn!(agent = %agent_config.name, "agent task died: {join_error}");
                    all_results.extend(synthesize_failed(
                        &agent_config,
                        &target_display,
                        passes,
                        "review task cancelled/unavailable",
                    ));
                }
                Err(_) => {
                    abort.abort();
                    warn!(
                        agent = %agent_config.name,
                        "orchestrator deadline of {} minutes exceeded, cancelling agent",
                        orchestrator_cfg.orchestrator_timeout_minutes
                    );
                    all_results.extend(synthesize_failed(
                        &agent_config,
                        &target_display,
                        passes,
                        "review cancelled: orchestrator deadline exceeded",
                    ));
                }
            }
        }

        let passes_succeeded = all_results.iter().filter(|r| r.success).count();
        let passes_failed = all_results.len() - passes_succeeded;
        info!(
            agents = request.agents.len(),
            passes_succeeded, passes_failed, "review run finished"
        );

        let results = if passes > 1 {
            aggregate_agent_results(all_results)
        } else {
            all_results
        };

        let summary = RunSummary {
            agents: request.agents.len(),
            passes_succeeded,
            passes_failed,
            wall_time: started.elapsed(),
        };
        Ok((results, summary))
    }

    /// Retry executor bound to the review channel's circuit breaker.
    fn review_retry_executor(&self) -> RetryExecutor {
        let circuit = &self.config.circuits.review;
        let breaker = Arc::new(CircuitBreaker::new(
            circuit.failure_threshold,
            circuit.open_duration_seconds * 1000,
            Arc::new(SystemClock),
        ));
        RetryExecutor::new(
            RetryConfig {
                max_attempts: self.config.orchestrator.max_retries + 1,
                backoff_base_ms: self.config.retry.review.backoff_base_ms,
                backoff_max_ms: self.config.retry.review.backoff_max_ms,
            },
            breaker,
        )
    }
}

/// Forward the opaque backend configuration for remote targets. The token
/// stays inside the map; it never reaches logs or checkpoints.
fn build_mcp_servers(request: &ReviewRequest) -> McpServerMap {
    let mut servers = McpServerMap::new();
    if let crate::types::ReviewTarget::GitHub { owner_repo } = &request.target {
        if let Some(token) = &request.token {
            servers.insert(
                "github".to_string(),
                serde_json::json!({
                    "repository": owner_repo,
                    "token": token,
                }),
            );
        }
    }
    servers
}

/// One agent's lifecycle: acquire a permit, run the passes under the
/// per-agent budget, checkpoint, release.
async fn run_agent_task(
    agent_config: AgentConfig,
    target: crate::types::ReviewTarget,
    context: Arc<ReviewContext>,
    semaphore: Arc<Semaphore>,
    passes: usize,
    checkpoint_dir: PathBuf,
) -> Vec<ReviewResult> {
    let target_display = target.display_name();

    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            // Semaphore closed: the run is shutting down before we started
            return synthesize_failed(
                &agent_config,
                &target_display,
                passes,
                "review interrupted before start",
            );
        }
    };

    let pass_budget = context.pass_timeout * (context.max_retries + 1);
    let total_budget = pass_budget * passes.max(1) as u32;
    let budget_minutes = total_budget.as_secs() / 60;

    let reviewer = ReviewAgent::new(agent_config.clone(), Arc::clone(&context));
    let results = match tokio::time::timeout(total_budget, reviewer.review_passes(&target, passes))
        .await
    {
        Ok(Ok(results)) => results,
        Ok(Err(err)) => {
            warn!(agent = %agent_config.name, "review passes failed: {err}");
            synthesize_failed(&agent_config, &target_display, passes, &err.to_string())
        }
        Err(_) => {
            warn!(agent = %agent_config.name, "per-agent budget exhausted");
            synthesize_failed(
                &agent_config,
                &target_display,
                passes,
                &format!("Review timed out after {budget_minutes} minutes"),
            )
        }
    };

    if let Err(err) =
        write_checkpoint(&checkpoint_dir, &target_display, &agent_config.name, &results).await
    {
        warn!(agent = %agent_config.name, "failed to write checkpoint: {err}");
    }

    drop(permit);
    results
}

/// K identical failed results so the `(agent, pass)` cardinality holds on
/// every exit path.
fn synthesize_failed(
    agent_config: &AgentConfig,
    target_display: &str,
    passes: usize,
    message: &str,
) -> Vec<ReviewResult> {
    (0..passes.max(1))
        .map(|_| ReviewResult::failure(agent_config, target_display, message.to_string()))
        .collect()
}

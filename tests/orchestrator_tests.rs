//! End-to-end orchestrator scenarios against a scripted model backend.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use review_swarm::config::Config;
use review_swarm::error::{ReviewError, Result};
use review_swarm::llm::{LlmClient, LlmResponse, LlmSession, McpServerMap, SendOptions};
use review_swarm::orchestrator::Orchestrator;
use review_swarm::types::{AgentConfig, ReviewRequest, ReviewTarget};

const FINDING: &str = "\
### 1. Issue A

| **Priority** | High |
| **該当箇所** | src/x.go:10 |
| **指摘の概要** | Null deref |";

/// Scripted backend shared by every session of a run.
struct MockPlan {
    response: String,
    delay: Duration,
    fail_first_call: bool,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockPlan {
    fn new(response: &str, delay: Duration, fail_first_call: bool) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            delay,
            fail_first_call,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn respond(response: &str) -> Arc<Self> {
        Self::new(response, Duration::ZERO, false)
    }

    fn with_delay(response: &str, delay: Duration) -> Arc<Self> {
        Self::new(response, delay, false)
    }

    fn never_returns() -> Arc<Self> {
        Self::with_delay("", Duration::from_secs(u32::MAX as u64))
    }
}

struct MockClient {
    plan: Arc<MockPlan>,
}

struct MockSession {
    plan: Arc<MockPlan>,
}

#[async_trait]
impl LlmClient for MockClient {
    async fn create_session(
        &self,
        _model: &str,
        _system_prompt: &str,
        _mcp_servers: &McpServerMap,
    ) -> Result<Box<dyn LlmSession>> {
        Ok(Box::new(MockSession {
            plan: Arc::clone(&self.plan),
        }))
    }
}

#[async_trait]
impl LlmSession for MockSession {
    async fn send(&self, _prompt: &str, _options: &SendOptions) -> Result<LlmResponse> {
        let call = self.plan.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.plan.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.plan.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.plan.delay).await;
        self.plan.active.fetch_sub(1, Ordering::SeqCst);

        if self.plan.fail_first_call && call == 0 {
            return Err(ReviewError::llm("network unavailable"));
        }
        Ok(LlmResponse {
            content: self.plan.response.clone(),
        })
    }

    async fn close(&self) {}
}

fn agent(name: &str) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        model: "sonnet".to_string(),
        system_prompt: "You review code.".to_string(),
        instruction_text: "Find defects.".to_string(),
        output_template: String::new(),
        focus_areas: vec![],
        skills: vec![],
    }
}

fn request(agents: Vec<AgentConfig>, passes: usize) -> ReviewRequest {
    ReviewRequest {
        target: ReviewTarget::GitHub {
            owner_repo: "octo/repo".to_string(),
        },
        agents,
        passes,
        token: None,
        instructions: vec![],
    }
}

fn test_config(checkpoint_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.orchestrator.checkpoint_directory = checkpoint_dir.to_path_buf();
    config.retry.review.backoff_base_ms = 10;
    config.retry.review.backoff_max_ms = 80;
    config
}

fn orchestrator(config: Config, plan: &Arc<MockPlan>) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(MockClient {
            plan: Arc::clone(plan),
        }),
    )
}

#[tokio::test]
async fn test_single_pass_success_returns_content_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::respond(FINDING);
    let orchestrator = orchestrator(test_config(dir.path()), &plan);

    let (results, summary) = orchestrator
        .execute_reviews(request(vec![agent("q")], 1))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].content.as_deref(), Some(FINDING));
    assert_eq!(summary.passes_succeeded, 1);
    assert_eq!(summary.passes_failed, 0);
}

#[tokio::test]
async fn test_result_cardinality_before_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::respond(FINDING);
    // One pass keeps the raw per-pass results in the output
    let orchestrator = orchestrator(test_config(dir.path()), &plan);

    let agents = vec![agent("a"), agent("b"), agent("c")];
    let (results, _) = orchestrator
        .execute_reviews(request(agents, 1))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(plan.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_multi_pass_dedup_yields_one_result_per_agent() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::respond(FINDING);
    let orchestrator = orchestrator(test_config(dir.path()), &plan);

    let (results, summary) = orchestrator
        .execute_reviews(request(vec![agent("a"), agent("b")], 2))
        .await
        .unwrap();

    // N·K passes ran, dedup leaves one entry per agent
    assert_eq!(summary.passes_succeeded, 4);
    assert_eq!(results.len(), 2);
    for result in &results {
        let content = result.content.as_deref().unwrap();
        assert!(content.contains("### 1. Issue A"));
        assert!(content.contains("> 検出パス: 1, 2"));
        assert!(!content.contains("### 2."));
    }
}

#[tokio::test(start_paused = true)]
async fn test_semaphore_bounds_concurrent_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::with_delay(FINDING, Duration::from_secs(1));
    let mut config = test_config(dir.path());
    config.orchestrator.parallelism = 2;
    let orchestrator = orchestrator(config, &plan);

    let agents = (0..5).map(|i| agent(&format!("agent{i}"))).collect();
    let (results, _) = orchestrator
        .execute_reviews(request(agents, 1))
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.success));
    assert!(plan.max_active.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_pass_timeout_produces_failed_result() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::never_returns();
    let mut config = test_config(dir.path());
    config.orchestrator.agent_timeout_minutes = 1;
    config.orchestrator.max_retries = 0;
    let orchestrator = orchestrator(config, &plan);

    let (results, summary) = orchestrator
        .execute_reviews(request(vec![agent("q")], 1))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    let message = results[0].error_message.as_deref().unwrap();
    assert!(
        message.contains("timed out after 1 minutes"),
        "unexpected message: {message}"
    );
    assert_eq!(summary.passes_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_deadline_cancels_stragglers() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::never_returns();
    let mut config = test_config(dir.path());
    // Generous per-agent budget, tight whole-run deadline
    config.orchestrator.agent_timeout_minutes = 60;
    config.orchestrator.orchestrator_timeout_minutes = 1;
    config.orchestrator.max_retries = 0;
    let orchestrator = orchestrator(config, &plan);

    let (results, _) = orchestrator
        .execute_reviews(request(vec![agent("a"), agent("b")], 1))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(!result.success);
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("cancelled"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried_to_success() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::new(FINDING, Duration::ZERO, true);
    let orchestrator = orchestrator(test_config(dir.path()), &plan);

    let (results, _) = orchestrator
        .execute_reviews(request(vec![agent("q")], 1))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(plan.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_checkpoint_written_per_agent() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::respond(FINDING);
    let orchestrator = orchestrator(test_config(dir.path()), &plan);

    orchestrator
        .execute_reviews(request(vec![agent("q")], 1))
        .await
        .unwrap();

    let checkpoint = dir.path().join("octo_repo_q.md");
    let written = std::fs::read_to_string(&checkpoint).unwrap();
    assert!(written.starts_with("# Intermediate Review Checkpoint\n"));
    assert!(written.contains("agent=q\n"));
    assert!(written.contains("target=octo/repo\n"));
    assert!(written.contains("success=true\n"));
    assert!(written.contains("### 1. Issue A"));
}

#[tokio::test]
async fn test_empty_model_output_is_a_failed_pass() {
    let dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::respond("   \n  ");
    let mut config = test_config(dir.path());
    config.orchestrator.max_retries = 0;
    let orchestrator = orchestrator(config, &plan);

    let (results, _) = orchestrator
        .execute_reviews(request(vec![agent("q")], 1))
        .await
        .unwrap();

    assert!(!results[0].success);
    assert!(results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("empty output"));
}

#[tokio::test]
async fn test_local_target_collects_sources_into_prompt() {
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("lib.rs"), "pub fn f() {}\n").unwrap();

    let checkpoint_dir = tempfile::tempdir().unwrap();
    let plan = MockPlan::respond(FINDING);
    let orchestrator = orchestrator(test_config(checkpoint_dir.path()), &plan);

    let request = ReviewRequest {
        target: ReviewTarget::Local {
            directory: source_dir.path().to_path_buf(),
        },
        agents: vec![agent("q")],
        passes: 1,
        token: None,
        instructions: vec![],
    };
    let (results, _) = orchestrator.execute_reviews(request).await.unwrap();
    assert!(results[0].success);
}

//! Per-run review context and prompt assembly.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::{LlmClient, McpServerMap};
use crate::resilience::RetryExecutor;
use crate::types::{AgentConfig, ReviewTarget, SourceBundle};

/// Shared, read-only state handed to every agent task: the client handle,
/// the deadlines, the retry executor pre-bound to the review circuit, and
/// the cached source bundle and MCP configuration.
pub struct ReviewContext {
    pub client: Arc<dyn LlmClient>,
    pub pass_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_retries: u32,
    pub user_instructions: Vec<String>,
    pub reasoning_effort: Option<String>,
    pub retry: RetryExecutor,
    pub mcp_servers: Arc<McpServerMap>,
    pub source_bundle: Arc<SourceBundle>,
}

/// Build the per-call review prompt: agent instructions, focus areas, the
/// expected output shape, caller instructions, then the target and its
/// collected sources.
pub fn build_review_prompt(
    agent: &AgentConfig,
    target: &ReviewTarget,
    context: &ReviewContext,
) -> String {
    let mut prompt = String::new();

    if !agent.instruction_text.is_empty() {
        prompt.push_str(agent.instruction_text.trim());
        prompt.push_str("\n\n");
    }

    if !agent.focus_areas.is_empty() {
        prompt.push_str("Focus areas:\n");
        for area in &agent.focus_areas {
            let _ = writeln!(prompt, "- {area}");
        }
        prompt.push('\n');
    }

    if !agent.output_template.is_empty() {
        prompt.push_str("Format every finding like this:\n\n");
        prompt.push_str(agent.output_template.trim());
        prompt.push_str("\n\n");
    }

    for instruction in &context.user_instructions {
        prompt.push_str(instruction.trim());
        prompt.push_str("\n\n");
    }

    let _ = writeln!(prompt, "Review target: {}", target.display_name());

    if !context.source_bundle.is_empty() {
        prompt.push('\n');
        prompt.push_str(&context.source_bundle.directory_summary);
        prompt.push_str("\n\n");
        prompt.push_str(&context.source_bundle.review_content);
    }

    prompt
}

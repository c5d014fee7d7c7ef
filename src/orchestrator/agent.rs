//! One agent's K sequential review passes against a single model session.

use std::sync::Arc;
use tracing::{debug, info};

use super::context::{build_review_prompt, ReviewContext};
use crate::error::{ReviewError, Result};
use crate::llm::{LlmSession, SendOptions};
use crate::resilience::{is_retryable_message, OutcomeClassifier};
use crate::types::{AgentConfig, ReviewResult, ReviewTarget};

/// Classifies pass outcomes for the retry executor.
struct PassClassifier {
    agent: AgentConfig,
    target_display: String,
}

impl OutcomeClassifier<ReviewResult> for PassClassifier {
    fn is_success(&self, result: &ReviewResult) -> bool {
        result.success
    }

    fn is_retryable(&self, result: &ReviewResult) -> bool {
        result
            .error_message
            .as_deref()
            .map(is_retryable_message)
            .unwrap_or(false)
    }

    fn failure_from(&self, err: ReviewError) -> ReviewResult {
        ReviewResult::failure(&self.agent, &self.target_display, err.to_string())
    }
}

/// Drives one agent through its passes. Owned by exactly one task.
pub struct ReviewAgent {
    config: AgentConfig,
    context: Arc<ReviewContext>,
}

impl ReviewAgent {
    pub fn new(config: AgentConfig, context: Arc<ReviewContext>) -> Self {
        Self { config, context }
    }

    /// Run `passes` sequential passes against one session. Always returns
    /// exactly `passes` results on success; session setup failures
    /// propagate so the caller can synthesize them.
    pub async fn review_passes(
        &self,
        target: &ReviewTarget,
        passes: usize,
    ) -> Result<Vec<ReviewResult>> {
        let session = tokio::time::timeout(
            self.context.pass_timeout,
            self.context.client.create_session(
                &self.config.model,
                &self.config.system_prompt,
                &self.context.mcp_servers,
            ),
        )
        .await
        .map_err(|_| {
            ReviewError::Timeout(format!(
                "session setup timed out after {}s",
                self.context.pass_timeout.as_secs()
            ))
        })??;

        let prompt = build_review_prompt(&self.config, target, &self.context);
        let target_display = target.display_name();
        let passes = passes.max(1);

        let mut results = Vec::with_capacity(passes);
        for pass in 1..=passes {
            debug!(agent = %self.config.name, pass, "starting review pass");
            let result = self
                .run_single_pass(session.as_ref(), &prompt, &target_display)
                .await;
            info!(
                agent = %self.config.name,
                pass,
                success = result.success,
                "review pass finished"
            );
            results.push(result);
        }

        session.close().await;
        Ok(results)
    }

    async fn run_single_pass(
        &self,
        session: &dyn LlmSession,
        prompt: &str,
        target_display: &str,
    ) -> ReviewResult {
        let options = SendOptions {
            timeout: self.context.pass_timeout,
            idle_timeout: self.context.idle_timeout,
            reasoning_effort: self.context.reasoning_effort.clone(),
        };
        let classifier = PassClassifier {
            agent: self.config.clone(),
            target_display: target_display.to_string(),
        };
        let agent = self.config.clone();
        let target_display = target_display.to_string();
        let pass_minutes = self.context.pass_timeout.as_secs() / 60;

        self.context
            .retry
            .execute(
                || {
                    let options = options.clone();
                    let agent = agent.clone();
                    let target_display = target_display.clone();
                    async move {
                        let response =
                            tokio::time::timeout(options.timeout, session.send(prompt, &options))
                                .await
                                .map_err(|_| {
                                    ReviewError::Timeout(format!(
                                        "review pass timed out after {pass_minutes} minutes"
                                    ))
                                })??;
                        if response.content.trim().is_empty() {
                            return Ok(ReviewResult::failure(
                                &agent,
                                &target_display,
                                "model returned empty output".to_string(),
                            ));
                        }
                        Ok(ReviewResult::success(
                            &agent,
                            &target_display,
                            response.content,
                        ))
                    }
                },
                &classifier,
                Some(&|remaining_ms| {
                    ReviewResult::failure(
                        &agent,
                        &target_display,
                        format!("review channel circuit open, retry in {remaining_ms} ms"),
                    )
                }),
            )
            .await
    }
}

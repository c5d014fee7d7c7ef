//! Subprocess-backed model client: each send invokes a configured CLI
//! (claude-style `--print` mode), writes the prompt on stdin, and reads
//! stdout with an idle bound between chunks.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{LlmClient, LlmResponse, LlmSession, McpServerMap, SendOptions};
use crate::config::LlmConfig;
use crate::error::{ReviewError, Result};

const STDOUT_CHUNK_SIZE: usize = 8192;

/// Client that shells out to a model CLI for every prompt.
pub struct SubprocessLlmClient {
    config: LlmConfig,
}

impl SubprocessLlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LlmClient for SubprocessLlmClient {
    async fn create_session(
        &self,
        model: &str,
        system_prompt: &str,
        mcp_servers: &McpServerMap,
    ) -> Result<Box<dyn LlmSession>> {
        if self.config.command.trim().is_empty() {
            return Err(ReviewError::config("llm.command is not configured"));
        }
        debug!(
            model,
            mcp_servers = mcp_servers.len(),
            "creating subprocess model session"
        );
        Ok(Box::new(SubprocessSession {
            command: self.config.command.clone(),
            args: self.config.args.clone(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        }))
    }
}

/// Stateless session: the CLI carries no conversation state between sends,
/// so the session only holds the invocation recipe.
struct SubprocessSession {
    command: String,
    args: Vec<String>,
    model: String,
    system_prompt: String,
}

#[async_trait]
impl LlmSession for SubprocessSession {
    async fn send(&self, prompt: &str, options: &SendOptions) -> Result<LlmResponse> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg("--model")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.system_prompt.is_empty() {
            command.arg("--system-prompt").arg(&self.system_prompt);
        }
        if let Some(effort) = &options.reasoning_effort {
            command.arg("--reasoning-effort").arg(effort);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ReviewError::llm(format!("failed to spawn {}: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ReviewError::llm(format!("failed to write prompt: {e}")))?;
            drop(stdin);
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReviewError::llm("model process has no stdout"))?;

        // Read until EOF; silence longer than the idle bound aborts the call.
        let mut content = Vec::new();
        let mut chunk = vec![0u8; STDOUT_CHUNK_SIZE];
        loop {
            let read = tokio::time::timeout(options.idle_timeout, stdout.read(&mut chunk))
                .await
                .map_err(|_| {
                    ReviewError::Timeout(format!(
                        "model produced no output for {}s",
                        options.idle_timeout.as_secs()
                    ))
                })?
                .map_err(|e| ReviewError::llm(format!("failed to read model output: {e}")))?;
            if read == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..read]);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ReviewError::llm(format!("failed to await model process: {e}")))?;
        let content = String::from_utf8_lossy(&content).to_string();

        if !status.success() && content.trim().is_empty() {
            let mut stderr_text = String::new();
            if let Some(mut stderr) = child.stderr.take() {
                let _ = stderr.read_to_string(&mut stderr_text).await;
            }
            warn!("model process exited with {status}");
            return Err(ReviewError::llm(format!(
                "model process exited with {status}: {}",
                stderr_text.trim()
            )));
        }

        Ok(LlmResponse { content })
    }

    async fn close(&self) {
        // Nothing persistent to release; each send owns its subprocess.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options() -> SendOptions {
        SendOptions {
            timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(5),
            reasoning_effort: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_echoes_stdout() {
        let session = SubprocessSession {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; echo reviewed".to_string()],
            model: String::new(),
            system_prompt: String::new(),
        };
        let response = session.send("prompt text", &options()).await.unwrap();
        assert_eq!(response.content.trim(), "reviewed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_surfaces_failure_exit() {
        let session = SubprocessSession {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; exit 3".to_string()],
            model: String::new(),
            system_prompt: String::new(),
        };
        let err = session.send("prompt", &options()).await.unwrap_err();
        assert!(err.to_string().contains("exited"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_idle_timeout_fires() {
        let session = SubprocessSession {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            model: String::new(),
            system_prompt: String::new(),
        };
        let opts = SendOptions {
            timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_millis(200),
            reasoning_effort: None,
        };
        let err = session.send("prompt", &opts).await.unwrap_err();
        assert!(matches!(err, ReviewError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_command() {
        let client = SubprocessLlmClient::new(LlmConfig {
            command: "  ".to_string(),
            ..Default::default()
        });
        let result = client
            .create_session("model", "", &McpServerMap::new())
            .await;
        assert!(result.is_err());
    }
}

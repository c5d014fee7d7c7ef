//! # LLM Client Boundary
//!
//! The review engine consumes exactly three operations from the model
//! backend: create a session, send a prompt within a wall-clock bound, and
//! close. Everything else about the backend is opaque; responses are read
//! only as `content`, and errors only as message strings for retryability
//! classification.

pub mod subprocess;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

pub use subprocess::SubprocessLlmClient;

/// Opaque per-session configuration blobs forwarded to the backend.
pub type McpServerMap = HashMap<String, serde_json::Value>;

/// Per-call bounds and hints.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Wall-clock bound for the whole call
    pub timeout: Duration,
    /// Bound on silence while the backend streams
    pub idle_timeout: Duration,
    /// Optional reasoning-effort hint passed through verbatim
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
}

/// One conversation with the backend, owned by a single task.
#[async_trait]
pub trait LlmSession: Send + Sync {
    /// Submit a prompt and wait for the full response within the bounds in
    /// `options`.
    async fn send(&self, prompt: &str, options: &SendOptions) -> Result<LlmResponse>;

    /// Release backend resources. Idempotent.
    async fn close(&self);
}

/// Factory for sessions against one configured backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn create_session(
        &self,
        model: &str,
        system_prompt: &str,
        mcp_servers: &McpServerMap,
    ) -> Result<Box<dyn LlmSession>>;
}

//! # Error Handling Module
//!
//! Error types and result alias used throughout review-swarm. Library
//! errors use `thiserror`; the CLI layer adds `anyhow` context on top.

use thiserror::Error;

/// Result type alias for review-swarm operations
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Error type covering the review engine and its collaborators
#[derive(Error, Debug)]
pub enum ReviewError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed user input (target, agent selection, required fields)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failures reported by the model backend
    #[error("Model call failed: {0}")]
    Llm(String),

    /// A deadline fired; the message names which one
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Cooperative cancellation observed mid-operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The circuit breaker refused the call
    #[error("Circuit open, retry in {remaining_ms} ms")]
    CircuitOpen { remaining_ms: u64 },

    /// Logging setup error
    #[error("Failed to setup logging")]
    LoggingSetup,
}

impl ReviewError {
    /// Create a new invalid-input error with a custom message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new model error with a custom message
    pub fn llm<S: Into<String>>(message: S) -> Self {
        Self::Llm(message.into())
    }
}

//! # review-swarm
//!
//! A parallel multi-agent code review driver:
//! - Runs N configured review agents × K passes against a GitHub repository
//!   or a local directory tree, bounded by a semaphore and nested deadlines
//! - Shields the model backend behind a circuit breaker and jittered retry
//! - Merges near-duplicate findings across passes with Dice-coefficient
//!   similarity over character bigrams
//! - Checkpoints per-agent results atomically so crashed runs stay
//!   inspectable
//!
//! ## Safety posture
//!
//! - **Bounded collection**: local sources respect per-file and aggregate
//!   byte caps; sensitive files never enter the prompt
//! - **Hardened subprocesses**: the `gh` binary is allowlist-checked after
//!   canonicalization; every child is wall-clock bounded
//! - **Credential hygiene**: tokens are passed as opaque strings and masked
//!   in diagnostics

pub mod cli;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod error;
pub mod github;
pub mod llm;
pub mod orchestrator;
pub mod resilience;
pub mod types;

// Re-export commonly used types
pub use crate::{
    config::Config,
    error::{ReviewError, Result},
    orchestrator::Orchestrator,
    types::*,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

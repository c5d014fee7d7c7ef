//! # Configuration Module
//!
//! TOML-backed configuration for review-swarm with environment variable
//! substitution and validation before any run starts.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::AgentConfig;

/// Top-level configuration for review-swarm
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Orchestration limits: parallelism, passes, deadlines, checkpoints
    pub orchestrator: OrchestratorConfig,
    /// Circuit breaker settings per call channel
    pub circuits: CircuitsConfig,
    /// Retry backoff settings per call channel
    pub retry: RetrySettings,
    /// Local source collection bounds and filters
    pub local_files: LocalFileConfig,
    /// GitHub access settings
    pub github: GithubConfig,
    /// Model backend invocation settings
    pub llm: LlmConfig,
    /// Review agents executed each run
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub parallelism: usize,
    pub review_passes: usize,
    pub agent_timeout_minutes: u64,
    pub orchestrator_timeout_minutes: u64,
    pub idle_timeout_minutes: u64,
    pub max_retries: u32,
    pub checkpoint_directory: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            review_passes: 1,
            agent_timeout_minutes: 5,
            orchestrator_timeout_minutes: 10,
            idle_timeout_minutes: 5,
            max_retries: 2,
            checkpoint_directory: PathBuf::from("reports/.checkpoints"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitsConfig {
    pub review: CircuitConfig,
    pub summary: CircuitConfig,
    pub skill: CircuitConfig,
}

impl Default for CircuitsConfig {
    fn default() -> Self {
        Self {
            review: CircuitConfig {
                failure_threshold: 5,
                open_duration_seconds: 30,
            },
            summary: CircuitConfig::default(),
            skill: CircuitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub open_duration_seconds: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_duration_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub review: RetryChannelConfig,
    pub aux: RetryChannelConfig,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            review: RetryChannelConfig {
                backoff_base_ms: 1000,
                backoff_max_ms: 8000,
            },
            aux: RetryChannelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryChannelConfig {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryChannelConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 500,
            backoff_max_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFileConfig {
    /// Per-file cap in bytes; larger files are excluded
    pub max_file_size: u64,
    /// Aggregate cap in bytes for the collected bundle
    pub max_total_size: u64,
    /// Directory names skipped during the walk (exact match)
    pub ignored_directories: Vec<String>,
    /// File extensions considered reviewable source
    pub source_extensions: Vec<String>,
    /// Filename substrings that mark a file as sensitive
    pub sensitive_file_patterns: Vec<String>,
    /// Extensions that mark a file as sensitive
    pub sensitive_extensions: Vec<String>,
}

impl Default for LocalFileConfig {
    fn default() -> Self {
        Self {
            max_file_size: 262_144,
            max_total_size: 2_097_152,
            ignored_directories: [
                ".git",
                ".hg",
                ".svn",
                "node_modules",
                "target",
                "build",
                "dist",
                "vendor",
                "__pycache__",
                ".idea",
                ".vscode",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            source_extensions: [
                "rs", "go", "java", "kt", "py", "js", "ts", "tsx", "jsx", "rb", "php", "c", "h",
                "cpp", "hpp", "cs", "swift", "scala", "sh", "sql", "yaml", "yml", "toml", "json",
                "md",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sensitive_file_patterns: [
                "secret", "credential", "password", "token", "apikey", "api_key", "private",
                ".env",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sensitive_extensions: ["pem", "key", "p12", "pfx", "jks", "keystore", "crt", "der"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Token used for remote targets; `${GITHUB_TOKEN}` defers to `gh`
    pub token: String,
    pub auth_timeout_seconds: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            auth_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Executable invoked for each model call
    pub command: String,
    /// Extra arguments placed before the prompt
    pub args: Vec<String>,
    /// Reasoning-effort hint forwarded to the backend verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--print".to_string()],
            reasoning_effort: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let processed_content = Self::process_env_vars(&content);

        let config: Config = toml::from_str(&processed_content).with_context(|| {
            format!(
                "Failed to parse config file: {} - run 'review-swarm init' to generate a valid config",
                path.display()
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Substitute `${VAR}` placeholders with environment values. Unset
    /// variables keep their placeholder so downstream code can detect them.
    pub fn process_env_vars(content: &str) -> String {
        let env_var_pattern = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
        let mut result = content.to_string();

        for capture in env_var_pattern.captures_iter(content) {
            let placeholder = &capture[0];
            let var_name = &capture[1];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        result
    }

    /// Validate configuration settings before a run starts
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.orchestrator.parallelism == 0 {
            anyhow::bail!("orchestrator.parallelism must be greater than zero");
        }
        if self.orchestrator.review_passes == 0 {
            anyhow::bail!("orchestrator.review_passes must be greater than zero");
        }
        if self.orchestrator.agent_timeout_minutes == 0 {
            anyhow::bail!("orchestrator.agent_timeout_minutes must be greater than zero");
        }
        if self.orchestrator.orchestrator_timeout_minutes == 0 {
            anyhow::bail!("orchestrator.orchestrator_timeout_minutes must be greater than zero");
        }

        for (channel, circuit) in [
            ("review", &self.circuits.review),
            ("summary", &self.circuits.summary),
            ("skill", &self.circuits.skill),
        ] {
            if circuit.failure_threshold == 0 {
                anyhow::bail!("circuits.{channel}.failure_threshold must be at least 1");
            }
            if circuit.open_duration_seconds == 0 {
                anyhow::bail!("circuits.{channel}.open_duration_seconds must be at least 1");
            }
        }

        for (channel, retry) in [("review", &self.retry.review), ("aux", &self.retry.aux)] {
            if retry.backoff_base_ms == 0 {
                anyhow::bail!("retry.{channel}.backoff_base_ms must be greater than zero");
            }
            if retry.backoff_max_ms < retry.backoff_base_ms {
                anyhow::bail!("retry.{channel}.backoff_max_ms must be >= backoff_base_ms");
            }
        }

        if self.local_files.max_file_size == 0 || self.local_files.max_total_size == 0 {
            anyhow::bail!("local_files size limits must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                anyhow::bail!("agent name cannot be empty");
            }
            if !seen.insert(agent.name.as_str()) {
                anyhow::bail!("duplicate agent name: {}", agent.name);
            }
        }

        Ok(())
    }
}

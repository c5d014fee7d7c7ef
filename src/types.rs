use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ReviewError;

/// What a review run points at: a remote repository handle or a local tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReviewTarget {
    GitHub { owner_repo: String },
    Local { directory: PathBuf },
}

impl ReviewTarget {
    /// Parse a CLI target string: `owner/repo` or a path to an existing
    /// directory. Paths win when both readings are possible.
    pub fn parse(raw: &str) -> Result<Self, ReviewError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ReviewError::invalid_input("review target cannot be empty"));
        }

        let path = PathBuf::from(trimmed);
        if path.is_dir() {
            let directory = path.canonicalize().map_err(|e| {
                ReviewError::invalid_input(format!("cannot resolve directory {trimmed}: {e}"))
            })?;
            return Ok(Self::Local { directory });
        }

        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::GitHub {
                    owner_repo: trimmed.to_string(),
                })
            }
            _ => Err(ReviewError::invalid_input(format!(
                "target must be an owner/repo pair or an existing directory, got: {trimmed}"
            ))),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::GitHub { owner_repo } => owner_repo.clone(),
            Self::Local { directory } => directory.display().to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

impl std::fmt::Display for ReviewTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One configured review agent. `name` is the identity key within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub instruction_text: String,
    #[serde(default)]
    pub output_template: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl AgentConfig {
    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// The outcome of one review pass by one agent.
///
/// `success == true` implies `content` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub agent_name: String,
    pub agent_display_name: String,
    pub target_display: String,
    pub content: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReviewResult {
    pub fn success(agent: &AgentConfig, target_display: &str, content: String) -> Self {
        Self {
            agent_name: agent.name.clone(),
            agent_display_name: agent.display_name().to_string(),
            target_display: target_display.to_string(),
            content: Some(content),
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(agent: &AgentConfig, target_display: &str, error_message: String) -> Self {
        Self {
            agent_name: agent.name.clone(),
            agent_display_name: agent.display_name().to_string(),
            target_display: target_display.to_string(),
            content: None,
            success: false,
            error_message: Some(error_message),
            timestamp: Utc::now(),
        }
    }
}

/// A size-bounded source artifact produced by the local collector.
#[derive(Debug, Clone, Default)]
pub struct SourceBundle {
    pub review_content: String,
    pub file_count: usize,
    pub directory_summary: String,
}

impl SourceBundle {
    /// Empty bundle used for remote targets.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.review_content.is_empty()
    }
}

/// Everything the orchestrator needs to drive one run.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub target: ReviewTarget,
    pub agents: Vec<AgentConfig>,
    pub passes: usize,
    pub token: Option<String>,
    pub instructions: Vec<String>,
}

/// Aggregate counters reported back to the CLI layer after a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub agents: usize,
    pub passes_succeeded: usize,
    pub passes_failed: usize,
    pub wall_time: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_target() {
        let target = ReviewTarget::parse("octo/repo").unwrap();
        assert_eq!(
            target,
            ReviewTarget::GitHub {
                owner_repo: "octo/repo".to_string()
            }
        );
        assert_eq!(target.display_name(), "octo/repo");
        assert!(!target.is_local());
    }

    #[test]
    fn test_parse_local_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = ReviewTarget::parse(dir.path().to_str().unwrap()).unwrap();
        assert!(target.is_local());
    }

    #[test]
    fn test_parse_rejects_malformed_targets() {
        assert!(ReviewTarget::parse("").is_err());
        assert!(ReviewTarget::parse("   ").is_err());
        assert!(ReviewTarget::parse("owner/repo/extra").is_err());
        assert!(ReviewTarget::parse("/nonexistent/absolute/path").is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_name() {
        let agent = AgentConfig {
            name: "quality".to_string(),
            display_name: String::new(),
            model: "m".to_string(),
            system_prompt: String::new(),
            instruction_text: String::new(),
            output_template: String::new(),
            focus_areas: vec![],
            skills: vec![],
        };
        assert_eq!(agent.display_name(), "quality");
    }
}

//! Atomic checkpointing of per-agent results.
//!
//! Each agent writes `<safeTarget>_<safeAgent>.md` once its passes finish,
//! via a temp file in the same directory and an atomic rename, so a reader
//! never observes a partial file.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ReviewError, Result};
use crate::types::ReviewResult;

/// Replace anything outside `[a-zA-Z0-9._-]` so target and agent names are
/// safe as file name components.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Serialize one agent's pass results in checkpoint format.
fn render_checkpoint(agent_name: &str, target_display: &str, results: &[ReviewResult]) -> String {
    let mut body = String::from("# Intermediate Review Checkpoint\n");
    body.push_str(&format!("agent={agent_name}\n"));
    body.push_str(&format!("target={target_display}\n"));

    for result in results {
        body.push_str("\n## pass-result\n");
        body.push_str(&format!("success={}\n", result.success));
        if let Some(error) = &result.error_message {
            if !error.is_empty() {
                body.push_str(&format!("error={error}\n"));
            }
        }
        if let Some(content) = &result.content {
            if !content.is_empty() {
                body.push_str(content);
                if !content.ends_with('\n') {
                    body.push('\n');
                }
            }
        }
    }
    body
}

/// Write the checkpoint for one `(target, agent)` pair. Returns the final
/// path. Failures surface as errors; the orchestrator logs and continues.
pub async fn write_checkpoint(
    directory: &Path,
    target_display: &str,
    agent_name: &str,
    results: &[ReviewResult],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(directory).await?;

    let file_name = format!(
        "{}_{}.md",
        sanitize_component(target_display),
        sanitize_component(agent_name)
    );
    let path = directory.join(file_name);
    let body = render_checkpoint(agent_name, target_display, results);

    let directory = directory.to_path_buf();
    let final_path = path.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&directory)?;
        temp.write_all(body.as_bytes())?;
        temp.flush()?;
        temp.persist(&final_path)
            .map_err(|e| ReviewError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| ReviewError::Cancelled(format!("checkpoint writer task failed: {e}")))??;

    Ok(path)
}

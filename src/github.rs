//! # GitHub Token Resolution
//!
//! Resolves a bearer token for remote targets: a caller-provided value wins,
//! otherwise the `gh` CLI is asked via a restricted subprocess invocation.
//! The binary is located through an allowlisted explicit path or a PATH scan;
//! anything whose canonical filename is not `gh` is refused.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Placeholder left in configs when the environment variable was unset.
const TOKEN_PLACEHOLDER: &str = "${GITHUB_TOKEN}";

/// Environment variable naming an explicit `gh` binary.
const GH_CLI_PATH_VAR: &str = "GH_CLI_PATH";

#[cfg(windows)]
const ALLOWED_GH_NAMES: &[&str] = &["gh", "gh.exe", "gh.cmd"];
#[cfg(not(windows))]
const ALLOWED_GH_NAMES: &[&str] = &["gh"];

/// Resolve a GitHub token from caller input or the `gh` CLI.
///
/// Never fails for expected cases; an unusable token source yields `None`
/// with the reason logged at warn.
pub async fn resolve_token(provided: Option<&str>, timeout: Duration) -> Option<String> {
    if let Some(token) = provided {
        let trimmed = token.trim();
        if !trimmed.is_empty() && trimmed != TOKEN_PLACEHOLDER {
            return Some(trimmed.to_string());
        }
    }

    let gh_path = locate_gh_cli(
        std::env::var_os(GH_CLI_PATH_VAR).as_deref(),
        std::env::var_os("PATH").as_deref(),
    )?;
    debug!("resolving GitHub token via {}", gh_path.display());
    run_gh_auth_token(&gh_path, timeout).await
}

/// Locate the `gh` binary. An explicit path must pass the allowlist check
/// after canonicalization; otherwise `PATH` entries are scanned with the
/// same check.
pub fn locate_gh_cli(explicit: Option<&OsStr>, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if let Some(raw) = explicit {
        let candidate = PathBuf::from(raw);
        let absolute = if candidate.is_absolute() {
            candidate
        } else {
            std::env::current_dir().ok()?.join(candidate)
        };
        return match validate_gh_candidate(&absolute) {
            Some(path) => Some(path),
            None => {
                warn!(
                    "{} does not point at an allowed gh executable: {}",
                    GH_CLI_PATH_VAR,
                    absolute.display()
                );
                None
            }
        };
    }

    let path_var = path_var?;
    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for name in ALLOWED_GH_NAMES {
            if let Some(path) = validate_gh_candidate(&dir.join(name)) {
                return Some(path);
            }
        }
    }
    None
}

/// Canonicalize and verify one candidate: the real path's filename must be
/// in the allowlist and the file must be executable.
fn validate_gh_candidate(candidate: &Path) -> Option<PathBuf> {
    let real_path = std::fs::canonicalize(candidate).ok()?;
    let file_name = real_path.file_name()?.to_str()?;
    if !is_allowed_gh_name(file_name) {
        return None;
    }
    if !is_executable(&real_path) {
        return None;
    }
    Some(real_path)
}

#[cfg(windows)]
fn is_allowed_gh_name(file_name: &str) -> bool {
    ALLOWED_GH_NAMES
        .iter()
        .any(|allowed| file_name.eq_ignore_ascii_case(allowed))
}

#[cfg(not(windows))]
fn is_allowed_gh_name(file_name: &str) -> bool {
    ALLOWED_GH_NAMES.contains(&file_name)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run `gh auth token -h github.com` within the wall-clock bound and return
/// the first line of output. The child's stderr shares stdout's pipe, so
/// the two streams arrive merged; `kill_on_drop` reaps the child if the
/// bound fires.
async fn run_gh_auth_token(gh_path: &Path, timeout: Duration) -> Option<String> {
    let (reader, stdout_writer) = match std::io::pipe() {
        Ok(pair) => pair,
        Err(e) => {
            warn!("failed to create output pipe for gh: {}", e);
            return None;
        }
    };
    let stderr_writer = match stdout_writer.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            warn!("failed to duplicate output pipe for gh: {}", e);
            return None;
        }
    };

    // The Command temporary drops at the end of this statement, closing the
    // parent's copies of the write end; the reader then sees EOF as soon as
    // the child exits.
    let child = Command::new(gh_path)
        .args(["auth", "token", "-h", "github.com"])
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_writer))
        .stderr(Stdio::from(stderr_writer))
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            warn!("failed to spawn {}: {}", gh_path.display(), e);
            return None;
        }
    };

    // Drain the merged stream off the async runtime while waiting, so a
    // chatty child cannot fill the pipe buffer and stall.
    let merged_reader = tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut reader = reader;
        let mut merged = String::new();
        let _ = reader.read_to_string(&mut merged);
        merged
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            warn!("gh auth token failed: {}", e);
            return None;
        }
        Err(_) => {
            warn!(
                "gh auth token did not exit within {}s, killing it",
                timeout.as_secs()
            );
            return None;
        }
    };

    let merged = merged_reader.await.unwrap_or_default();

    if !status.success() {
        warn!("gh auth token exited with {}: {}", status, merged.trim());
        return None;
    }

    let token = merged.lines().next().map(str::trim).unwrap_or_default();
    if token.is_empty() {
        warn!("gh auth token produced no output");
        return None;
    }
    debug!("resolved GitHub token {}", mask_secret(token));
    Some(token.to_string())
}

/// Mask a credential for diagnostics: everything but the last four
/// characters is replaced.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

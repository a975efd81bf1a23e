//! Pre-flight checks run before any worktree is created

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::git::GitCli;

/// Free space required for a new worktree unless the caller overrides it
pub const DEFAULT_REQUIRED_DISK_MB: u64 = 1000;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Characters git refuses anywhere in a ref name
static FORBIDDEN_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[~^:\\?*\[\]@{]").expect("valid regex"));

/// Explain why `name` is not a legal branch name, or `None` if it is
///
/// Mirrors git's ref-name rules without spawning git.
pub fn branch_name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("branch name is empty");
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Some("contains whitespace or control characters");
    }
    if name.starts_with('.') {
        return Some("starts with '.'");
    }
    if name.starts_with('-') {
        return Some("starts with '-'");
    }
    if name.ends_with('/') {
        return Some("ends with '/'");
    }
    if name.ends_with('.') {
        return Some("ends with '.'");
    }
    if name.contains("..") {
        return Some("contains '..'");
    }
    if name.contains("//") {
        return Some("contains '//'");
    }
    if FORBIDDEN_CHARS.is_match(name) {
        return Some("contains one of ~ ^ : \\ ? * [ ] @ {");
    }
    None
}

pub fn is_valid_branch_name(name: &str) -> bool {
    branch_name_problem(name).is_none()
}

/// Occupancy of a prospective worktree directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    NotFound,
    /// Exists with no entries, or only a `.git` file
    Empty,
    Exists,
}

/// Classify the destination path for collision handling
pub fn check_worktree_path(path: &Path) -> PathState {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PathState::NotFound,
        // A file, or an unreadable directory: either way something is there.
        Err(_) => return PathState::Exists,
    };

    let names: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .take(2)
        .collect();

    match names.as_slice() {
        [] => PathState::Empty,
        [only] if only == ".git" => PathState::Empty,
        _ => PathState::Exists,
    }
}

/// Free megabytes on the filesystem holding `path` or its nearest existing ancestor
pub fn available_disk_mb(path: &Path) -> Option<u64> {
    let existing = path.ancestors().find(|candidate| candidate.exists())?;
    fs2::available_space(existing)
        .ok()
        .map(|bytes| bytes / BYTES_PER_MB)
}

/// Whether at least `required_mb` is free at `path`
///
/// Fails open: when free space cannot be measured, creation is not blocked.
pub fn has_sufficient_disk_space(path: &Path, required_mb: u64) -> bool {
    match available_disk_mb(path) {
        Some(available) => available >= required_mb,
        None => {
            tracing::debug!(path = %path.display(), "could not measure free space, assuming enough");
            true
        }
    }
}

/// Whether a local branch exists; any git failure counts as "no"
pub fn branch_exists(repo_root: &Path, branch: &str) -> bool {
    match GitCli::new(repo_root).branch_exists(branch) {
        Ok(exists) => exists,
        Err(e) => {
            tracing::debug!(branch, error = %e, "branch lookup failed");
            false
        }
    }
}

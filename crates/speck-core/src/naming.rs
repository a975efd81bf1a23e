//! Worktree directory and branch naming
//!
//! Worktrees always live next to the main repository, never inside it.
//! Whether their directory names need the repository name as a prefix depends
//! on how the user lays out checkouts on disk.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::SpeckError;
use crate::git::GitCli;

/// Used when a branch slugifies to nothing
const FALLBACK_DIR_NAME: &str = "worktree";

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]").expect("valid regex"));

static DASH_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// How checkouts are arranged next to each other on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoLayout {
    /// `~/code/myapp`: siblings need a `myapp-` prefix to stay distinguishable
    RepoNameDir,
    /// `~/code/myapp/main`: the directory is named after its branch, so
    /// siblings are named after theirs
    BranchNameDir,
}

/// Detect the layout from the repository directory name and its branch
///
/// Anything that cannot be determined (detached HEAD, git failure) is
/// treated as [`RepoLayout::RepoNameDir`], the safer choice since it never
/// produces bare branch-named siblings.
pub fn detect_repo_layout(repo_path: &Path) -> RepoLayout {
    let Some(dir_name) = repo_path.file_name().and_then(|n| n.to_str()) else {
        return RepoLayout::RepoNameDir;
    };

    match GitCli::new(repo_path).current_branch() {
        Ok(Some(branch)) if dir_name == branch || dir_name == slugify_branch_name(&branch) => {
            RepoLayout::BranchNameDir
        }
        Ok(_) => RepoLayout::RepoNameDir,
        Err(e) => {
            tracing::debug!(error = %e, "could not read current branch, assuming repo-name layout");
            RepoLayout::RepoNameDir
        }
    }
}

/// Turn a branch name into a filesystem-friendly slug
///
/// Lowercases, maps every character outside `[a-z0-9_-]` (including `/`) to
/// `-`, collapses dash runs and trims dashes from both ends. Distinct
/// branches can collide; callers handle existing paths separately.
pub fn slugify_branch_name(branch: &str) -> String {
    let lowered = branch.to_lowercase();
    let replaced = NON_SLUG_CHARS.replace_all(&lowered, "-");
    let collapsed = DASH_RUNS.replace_all(&replaced, "-");
    collapsed.trim_matches('-').to_string()
}

/// Prepend the configured prefix unless the branch already carries it
pub fn apply_branch_prefix(branch: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() && !branch.starts_with(prefix) => {
            format!("{}{}", prefix, branch)
        }
        _ => branch.to_string(),
    }
}

/// Layout-aware default directory name for a branch's worktree
pub fn worktree_dir_name(repo_name: &str, branch: &str, layout: RepoLayout) -> String {
    let slug = slugify_branch_name(branch);
    let slug = if slug.is_empty() {
        FALLBACK_DIR_NAME.to_string()
    } else {
        slug
    };

    match layout {
        RepoLayout::BranchNameDir => slug,
        RepoLayout::RepoNameDir => format!("{}-{}", repo_name, slug),
    }
}

/// Substitute `{repo}`, `{branch}` and `{name}` in a worktree path template
pub fn render_worktree_dir_template(template: &str, repo: &str, branch_slug: &str, name: &str) -> String {
    template
        .replace("{repo}", repo)
        .replace("{branch}", branch_slug)
        .replace("{name}", name)
}

/// Compute the sibling path a branch's worktree should live at
///
/// The result is always `parent(repo_path)/<rendered template>`.
pub fn construct_worktree_path(
    repo_path: &Path,
    branch: &str,
    template: &str,
) -> Result<PathBuf, SpeckError> {
    let invalid = |reason: &str| SpeckError::InvalidWorktreePath {
        path: repo_path.display().to_string(),
        reason: reason.to_string(),
    };

    let repo_name = repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("repository directory has no usable name"))?;
    let parent = repo_path
        .parent()
        .ok_or_else(|| invalid("repository has no parent directory"))?;

    let layout = detect_repo_layout(repo_path);
    let name = worktree_dir_name(repo_name, branch, layout);
    let rendered = render_worktree_dir_template(
        template,
        repo_name,
        &slugify_branch_name(branch),
        &name,
    );

    if rendered.is_empty()
        || rendered.contains(['/', '\\'])
        || rendered == "."
        || rendered == ".."
    {
        return Err(invalid(&format!(
            "template \"{}\" must render to a single directory name, got \"{}\"",
            template, rendered
        )));
    }

    Ok(parent.join(rendered))
}

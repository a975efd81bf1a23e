//! Worktree lifecycle: create, remove, list and prune
//!
//! `create_worktree` is a strictly ordered pipeline. Every check runs before
//! `git worktree add`; once that succeeds the worktree is left on disk no
//! matter what happens next, and a fatal later failure is reported as
//! [`SpeckError::WorktreeIncomplete`] instead of being rolled back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::load_config;
use crate::deps::{InstallOutcome, install_dependencies, resolve_package_manager};
use crate::error::SpeckError;
use crate::file_rules::{FileRulesOutcome, apply_file_rules};
use crate::git::{GitCli, GitWorktreeInfo};
use crate::ide::{IdeLaunchOutcome, launch_ide};
use crate::naming::{apply_branch_prefix, construct_worktree_path};
use crate::progress::{Progress, ProgressEvent};
use crate::root::main_repo_root;
use crate::validation::{
    DEFAULT_REQUIRED_DISK_MB, PathState, available_disk_mb, branch_exists, branch_name_problem,
    check_worktree_path, has_sufficient_disk_space,
};

/// Options for [`create_worktree`]
#[derive(Debug, Clone)]
pub struct CreateWorktreeOptions {
    /// Any path inside the main repository
    pub repo_path: PathBuf,
    /// Branch to check out; the configured prefix is applied if missing
    pub branch: String,
    /// Explicit destination instead of the computed sibling path
    pub worktree_path: Option<PathBuf>,
    pub skip_ide: bool,
    pub skip_deps: bool,
    /// Keep an occupied destination instead of failing
    pub reuse_existing: bool,
    /// Delete an occupied destination before creating
    pub force: bool,
    pub required_disk_mb: u64,
}

impl CreateWorktreeOptions {
    pub fn new(repo_path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            branch: branch.into(),
            worktree_path: None,
            skip_ide: false,
            skip_deps: false,
            reuse_existing: false,
            force: false,
            required_disk_mb: DEFAULT_REQUIRED_DISK_MB,
        }
    }
}

/// Health of a created worktree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorktreeStatus {
    /// Everything configured succeeded
    Ready,
    /// Created, but some non-fatal steps failed
    Degraded,
    /// Created, but a fatal step failed afterwards
    Failed,
}

/// Description of a worktree produced by [`create_worktree`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeMetadata {
    /// Fully qualified branch name, prefix included
    pub branch_name: String,
    pub worktree_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub status: WorktreeStatus,
    pub parent_repo: PathBuf,
}

impl WorktreeMetadata {
    /// Metadata for a worktree left behind by [`SpeckError::WorktreeIncomplete`]
    pub fn from_incomplete(error: &SpeckError, parent_repo: &Path) -> Option<Self> {
        match error {
            SpeckError::WorktreeIncomplete { branch, path, .. } => Some(Self {
                branch_name: branch.clone(),
                worktree_path: path.clone(),
                created_at: Utc::now(),
                status: WorktreeStatus::Failed,
                parent_repo: parent_repo.to_path_buf(),
            }),
            _ => None,
        }
    }
}

/// Everything `create_worktree` did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeOutcome {
    pub metadata: WorktreeMetadata,
    /// Non-fatal problems, in the order they happened
    pub warnings: Vec<String>,
    pub file_rules: FileRulesOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ide: Option<IdeLaunchOutcome>,
}

/// How the destination directory was prepared for `git worktree add`
enum Claim {
    /// We created the directory and own it until git does
    Created,
    /// Directory already existed and was empty
    Existing,
    /// Occupied directory moved aside to be merged back after checkout
    Stashed(PathBuf),
}

/// Resolve the main repository for any path inside it
///
/// From inside a linked worktree this is the repository that owns it, so
/// naming, config and file rules always start from the same place.
pub fn main_repository(repo_path: &Path) -> Result<PathBuf, SpeckError> {
    GitCli::new(repo_path)
        .toplevel()
        .map(|toplevel| main_repo_root(&toplevel))
        .map_err(|e| SpeckError::git(format!("resolving repository at {}", repo_path.display()), e))
}

fn resolve_destination(
    repo_root: &Path,
    branch: &str,
    template: &str,
    custom: Option<&Path>,
) -> Result<PathBuf, SpeckError> {
    match custom {
        Some(path) => std::path::absolute(path)
            .map_err(|e| SpeckError::InvalidWorktreePath {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        None => construct_worktree_path(repo_root, branch, template),
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn stash_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.speck-reuse-{}", name, std::process::id()))
}

/// Make `dest` ready for `git worktree add`
///
/// A missing directory is created with a single `create_dir`, which fails if
/// another process got there first.
fn claim_destination(
    dest: &Path,
    state: PathState,
    options: &CreateWorktreeOptions,
    warnings: &mut Vec<String>,
    progress: &Progress,
) -> Result<Claim, SpeckError> {
    let occupied = || SpeckError::PathOccupied {
        path: dest.display().to_string(),
    };

    match state {
        PathState::Exists if options.force => {
            progress.step(format!("Removing existing {}", dest.display()));
            remove_path(dest).map_err(|e| SpeckError::fs("remove", dest, e))?;
        }
        PathState::Exists if options.reuse_existing && dest.is_dir() => {
            let stash = stash_path(dest);
            fs::rename(dest, &stash).map_err(|e| SpeckError::fs("move aside", dest, e))?;
            let warning = format!("reusing existing directory {}", dest.display());
            progress.warn(warning.clone());
            warnings.push(warning);
            return match fs::create_dir(dest) {
                Ok(()) => Ok(Claim::Stashed(stash)),
                Err(e) => {
                    let _ = fs::rename(&stash, dest);
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        Err(occupied())
                    } else {
                        Err(SpeckError::fs("create", dest, e))
                    }
                }
            };
        }
        PathState::Exists => return Err(occupied()),
        PathState::Empty => {
            // Only a leftover `.git` file can be here; git refuses a non-empty target.
            let stale = dest.join(".git");
            if fs::symlink_metadata(&stale).is_ok() {
                remove_path(&stale).map_err(|e| SpeckError::fs("remove", &stale, e))?;
            }
            return Ok(Claim::Existing);
        }
        PathState::NotFound => {}
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| SpeckError::fs("create directory", parent, e))?;
    }
    match fs::create_dir(dest) {
        Ok(()) => Ok(Claim::Created),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(occupied()),
        Err(e) => Err(SpeckError::fs("create", dest, e)),
    }
}

/// Undo a claim after `git worktree add` failed
fn release_claim(dest: &Path, claim: &Claim) {
    let result = match claim {
        Claim::Created => fs::remove_dir(dest),
        Claim::Existing => Ok(()),
        Claim::Stashed(stash) => fs::remove_dir(dest).and_then(|()| fs::rename(stash, dest)),
    };
    if let Err(e) = result {
        tracing::warn!(path = %dest.display(), error = %e, "could not release worktree directory");
    }
}

/// Move entries kept from a reused directory back next to the checkout
///
/// Entries the checkout also provides stay in the stash, which is then kept.
fn restore_stash(dest: &Path, stash: &Path, warnings: &mut Vec<String>) {
    let entries = match fs::read_dir(stash) {
        Ok(entries) => entries,
        Err(e) => {
            warnings.push(format!("could not read {}: {}", stash.display(), e));
            return;
        }
    };

    let mut conflicts = 0;
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let target = dest.join(&name);
        if fs::symlink_metadata(&target).is_ok() {
            conflicts += 1;
            continue;
        }
        if let Err(e) = fs::rename(entry.path(), &target) {
            warnings.push(format!("could not restore {}: {}", target.display(), e));
            conflicts += 1;
        }
    }

    if conflicts == 0 {
        let _ = fs::remove_dir_all(stash);
    } else {
        warnings.push(format!(
            "{} entries of the reused directory conflicted with the checkout and were kept in {}",
            conflicts,
            stash.display()
        ));
    }
}

/// Create a worktree for an existing branch
///
/// Steps run in order and each gates the next: prune, load config, resolve
/// names, check the branch, check for duplicates, check disk space, claim
/// the destination, `git worktree add`, apply file rules, install
/// dependencies, launch the IDE.
pub fn create_worktree(
    options: &CreateWorktreeOptions,
    progress: &Progress,
) -> Result<CreateWorktreeOutcome, SpeckError> {
    let repo_root = main_repository(&options.repo_path)?;
    let git = GitCli::new(&repo_root);
    git.ensure_worktree_support()
        .map_err(|e| SpeckError::git("checking git version", e))?;

    progress.step("Pruning stale worktrees");
    if let Err(e) = git.prune_worktrees() {
        tracing::warn!(error = %e, "best-effort prune failed");
    }

    progress.step("Loading configuration");
    let config = load_config(&repo_root)?;
    let settings = &config.worktree;

    if let Some(reason) = branch_name_problem(&options.branch) {
        return Err(SpeckError::InvalidBranchName {
            branch: options.branch.clone(),
            reason: reason.to_string(),
        });
    }
    let branch = apply_branch_prefix(&options.branch, settings.branch_prefix.as_deref());
    if let Some(reason) = branch_name_problem(&branch) {
        return Err(SpeckError::InvalidBranchName {
            branch,
            reason: reason.to_string(),
        });
    }
    let dest = resolve_destination(
        &repo_root,
        &branch,
        &settings.worktree_path,
        options.worktree_path.as_deref(),
    )?;
    tracing::debug!(branch = %branch, dest = %dest.display(), "resolved worktree");

    progress.step(format!("Checking branch {}", branch));
    if !branch_exists(&repo_root, &branch) {
        return Err(SpeckError::BranchNotFound { branch });
    }

    let existing = git
        .list_worktrees()
        .map_err(|e| SpeckError::git("listing worktrees", e))?;
    if let Some(wt) = existing
        .iter()
        .find(|wt| wt.branch.as_deref() == Some(branch.as_str()))
    {
        return Err(SpeckError::WorktreeAlreadyExists {
            branch,
            path: wt.path.display().to_string(),
        });
    }

    progress.step("Checking disk space");
    if !has_sufficient_disk_space(&dest, options.required_disk_mb) {
        return Err(SpeckError::InsufficientDiskSpace {
            path: dest.display().to_string(),
            available_mb: available_disk_mb(&dest).unwrap_or(0),
            required_mb: options.required_disk_mb,
        });
    }

    let mut warnings = Vec::new();
    let state = check_worktree_path(&dest);
    let claim = claim_destination(&dest, state, options, &mut warnings, progress)?;

    progress.step(format!("Creating worktree at {}", dest.display()));
    if let Err(e) = git.add_worktree(&dest, &branch) {
        release_claim(&dest, &claim);
        return Err(SpeckError::git(
            format!("adding worktree for '{}' at {}", branch, dest.display()),
            e,
        ));
    }
    let created_at = Utc::now();
    if let Claim::Stashed(stash) = &claim {
        restore_stash(&dest, stash, &mut warnings);
    }

    // The worktree exists from here on; nothing below removes it.
    progress.step("Applying file rules");
    let file_rules = match apply_file_rules(
        &repo_root,
        &dest,
        &settings.files.rules,
        settings.files.include_untracked,
        progress,
    ) {
        Ok(outcome) => {
            for failure in &outcome.failures {
                let warning = format!(
                    "could not {} {}: {}",
                    failure.action.as_str(),
                    failure.path,
                    failure.message
                );
                progress.warn(warning.clone());
                warnings.push(warning);
            }
            outcome
        }
        Err(e) => {
            let warning = format!("file rules were not applied: {}", e);
            progress.warn(warning.clone());
            warnings.push(warning);
            FileRulesOutcome::default()
        }
    };

    let install = if settings.dependencies.auto_install && !options.skip_deps {
        let package_manager = resolve_package_manager(&dest, settings.dependencies.package_manager);
        progress.step(format!("Installing dependencies with {}", package_manager));
        match install_dependencies(&dest, package_manager, progress) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                return Err(SpeckError::WorktreeIncomplete {
                    branch,
                    path: dest,
                    source: Box::new(e),
                });
            }
        }
    } else {
        None
    };

    let ide = if settings.ide.auto_launch && !options.skip_ide {
        progress.step(format!("Opening {}", settings.ide.editor.as_str()));
        let outcome = launch_ide(settings.ide.editor, &dest, settings.ide.new_window);
        match (&outcome, outcome.warning()) {
            (IdeLaunchOutcome::Launched { command }, _) => {
                progress.emit(ProgressEvent::IdeLaunched {
                    command: command.clone(),
                });
            }
            (_, Some(warning)) => {
                progress.warn(warning.clone());
                warnings.push(warning);
            }
            (_, None) => {}
        }
        Some(outcome)
    } else {
        None
    };

    let status = if warnings.is_empty() {
        WorktreeStatus::Ready
    } else {
        WorktreeStatus::Degraded
    };

    Ok(CreateWorktreeOutcome {
        metadata: WorktreeMetadata {
            branch_name: branch,
            worktree_path: dest,
            created_at,
            status,
            parent_repo: repo_root,
        },
        warnings,
        file_rules,
        install,
        ide,
    })
}

/// Options for [`remove_worktree`]
#[derive(Debug, Clone)]
pub struct RemoveWorktreeOptions {
    pub repo_path: PathBuf,
    pub branch: String,
    /// Remove even with local changes, and force-delete the branch
    pub force: bool,
    pub delete_branch: bool,
}

impl RemoveWorktreeOptions {
    pub fn new(repo_path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            branch: branch.into(),
            force: false,
            delete_branch: false,
        }
    }
}

/// What `remove_worktree` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveWorktreeOutcome {
    pub worktree_path: PathBuf,
    pub branch_name: String,
    /// git refused, so the directory was deleted directly
    pub used_fallback: bool,
    pub branch_deleted: bool,
    pub warnings: Vec<String>,
}

/// Remove the worktree that has `branch` checked out
///
/// Both the branch as given and with the configured prefix are looked up.
/// If `git worktree remove` fails the directory is deleted directly and the
/// stale record pruned.
pub fn remove_worktree(
    options: &RemoveWorktreeOptions,
    progress: &Progress,
) -> Result<RemoveWorktreeOutcome, SpeckError> {
    let repo_root = main_repository(&options.repo_path)?;
    let git = GitCli::new(&repo_root);
    let config = load_config(&repo_root)?;

    let prefixed = apply_branch_prefix(&options.branch, config.worktree.branch_prefix.as_deref());
    let worktrees = git
        .list_worktrees()
        .map_err(|e| SpeckError::git("listing worktrees", e))?;

    let (index, target) = worktrees
        .iter()
        .enumerate()
        .find(|(_, wt)| {
            matches!(wt.branch.as_deref(), Some(b) if b == options.branch || b == prefixed)
        })
        .ok_or_else(|| SpeckError::WorktreeNotFound {
            branch: options.branch.clone(),
        })?;

    // git always lists the main worktree first.
    if index == 0 {
        return Err(SpeckError::InvalidWorktreePath {
            path: target.path.display().to_string(),
            reason: "this is the main worktree, not a linked one".to_string(),
        });
    }

    let worktree_path = target.path.clone();
    let branch_name = target.branch.clone().unwrap_or_else(|| prefixed.clone());
    let mut warnings = Vec::new();

    progress.step(format!("Removing worktree {}", worktree_path.display()));
    let used_fallback = match git.remove_worktree(&worktree_path, options.force) {
        Ok(()) => false,
        Err(e) => {
            tracing::warn!(error = %e, "git worktree remove failed, deleting directly");
            if worktree_path.exists() {
                fs::remove_dir_all(&worktree_path)
                    .map_err(|io| SpeckError::fs("remove", &worktree_path, io))?;
            }
            if let Err(e) = git.prune_worktrees() {
                warnings.push(format!("could not prune worktree records: {}", e));
            }
            true
        }
    };

    let mut branch_deleted = false;
    if options.delete_branch {
        progress.step(format!("Deleting branch {}", branch_name));
        match git.delete_branch(&branch_name, options.force) {
            Ok(()) => branch_deleted = true,
            Err(e) => {
                let warning = format!("worktree removed but branch '{}' was kept: {}", branch_name, e);
                progress.warn(warning.clone());
                warnings.push(warning);
            }
        }
    }

    Ok(RemoveWorktreeOutcome {
        worktree_path,
        branch_name,
        used_fallback,
        branch_deleted,
        warnings,
    })
}

/// Worktrees of the repository; empty if git cannot be queried
pub fn list_worktrees(repo_path: &Path) -> Vec<GitWorktreeInfo> {
    match GitCli::new(repo_path).list_worktrees() {
        Ok(worktrees) => worktrees,
        Err(e) => {
            tracing::warn!(repo = %repo_path.display(), error = %e, "could not list worktrees");
            Vec::new()
        }
    }
}

/// Result of [`prune_worktrees`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub pruned_paths: Vec<PathBuf>,
    pub dry_run: bool,
}

/// Forget worktrees whose directories are gone
///
/// The stale set is computed first; with `dry_run` nothing is changed.
pub fn prune_worktrees(repo_path: &Path, dry_run: bool) -> Result<PruneOutcome, SpeckError> {
    let git = GitCli::new(repo_path);
    let worktrees = git
        .list_worktrees()
        .map_err(|e| SpeckError::git("listing worktrees", e))?;

    let pruned_paths: Vec<PathBuf> = worktrees
        .into_iter()
        .skip(1)
        .filter(|wt| wt.prunable.is_some() || (!wt.bare && !wt.path.exists()))
        .map(|wt| wt.path)
        .collect();

    if !dry_run && !pruned_paths.is_empty() {
        git.prune_worktrees()
            .map_err(|e| SpeckError::git("pruning worktrees", e))?;
    }

    Ok(PruneOutcome {
        pruned_paths,
        dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stash_path_is_hidden_sibling() {
        let stash = stash_path(Path::new("/code/app-feature"));
        assert_eq!(stash.parent(), Some(Path::new("/code")));
        let name = stash.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".app-feature.speck-reuse-"));
    }

    #[test]
    fn test_claim_creates_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("wt");
        let options = CreateWorktreeOptions::new(temp.path(), "x");
        let mut warnings = Vec::new();

        let claim = claim_destination(
            &dest,
            PathState::NotFound,
            &options,
            &mut warnings,
            &Progress::silent(),
        )
        .unwrap();
        assert!(matches!(claim, Claim::Created));
        assert!(dest.is_dir());

        // A second claimant loses.
        let err = claim_destination(
            &dest,
            PathState::NotFound,
            &options,
            &mut warnings,
            &Progress::silent(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), "E013");

        release_claim(&dest, &claim);
        assert!(!dest.exists());
    }

    #[test]
    fn test_claim_occupied_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("wt");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("notes.txt"), "keep").unwrap();
        let mut warnings = Vec::new();

        let options = CreateWorktreeOptions::new(temp.path(), "x");
        let err = claim_destination(&dest, PathState::Exists, &options, &mut warnings, &Progress::silent())
            .err()
            .unwrap();
        assert_eq!(err.code(), "E013");

        let mut reuse = options.clone();
        reuse.reuse_existing = true;
        let claim =
            claim_destination(&dest, PathState::Exists, &reuse, &mut warnings, &Progress::silent())
                .unwrap();
        let Claim::Stashed(stash) = &claim else {
            panic!("expected stashed claim");
        };
        assert!(stash.join("notes.txt").exists());
        assert_eq!(warnings.len(), 1);

        fs::write(dest.join("README.md"), "checkout").unwrap();
        restore_stash(&dest, stash, &mut warnings);
        assert!(dest.join("notes.txt").exists());
        assert!(!stash.exists());

        let mut force = options;
        force.force = true;
        let claim =
            claim_destination(&dest, PathState::Exists, &force, &mut warnings, &Progress::silent())
                .unwrap();
        assert!(matches!(claim, Claim::Created));
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_metadata_from_incomplete() {
        let err = SpeckError::WorktreeIncomplete {
            branch: "feature/x".to_string(),
            path: PathBuf::from("/code/app-feature-x"),
            source: Box::new(SpeckError::BranchNotFound {
                branch: "feature/x".to_string(),
            }),
        };
        let metadata = WorktreeMetadata::from_incomplete(&err, Path::new("/code/app")).unwrap();
        assert_eq!(metadata.status, WorktreeStatus::Failed);
        assert_eq!(metadata.worktree_path, PathBuf::from("/code/app-feature-x"));

        let other = SpeckError::WorktreeNotFound {
            branch: "x".to_string(),
        };
        assert!(WorktreeMetadata::from_incomplete(&other, Path::new("/code/app")).is_none());
    }
}

//! Materialize selected files from the main checkout into a new worktree
//!
//! Copy candidates come from git's tracked-file list (optionally plus
//! untracked, non-ignored files), never from walking the filesystem, so build
//! output and `.git` internals are excluded unless a rule names them.
//! Symlink rules point the worktree at the source checkout's copy, which is
//! how large optional directories like `node_modules` are shared.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{FileAction, FileRule, config_path};
use crate::error::SpeckError;
use crate::git::GitCli;
use crate::progress::{Progress, ProgressEvent};

/// Files copied concurrently per batch; bounds open file descriptors
pub const COPY_BATCH_SIZE: usize = 16;

/// A single path that could not be materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRuleFailure {
    pub path: String,
    pub action: FileAction,
    pub message: String,
}

/// What `apply_file_rules` did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileRulesOutcome {
    /// Copied paths, relative to the repository root, sorted
    pub copied: Vec<String>,
    /// Symlinks created, relative to the worktree root
    pub symlinked: Vec<String>,
    pub failures: Vec<FileRuleFailure>,
}

/// Compile one rule pattern
///
/// `*` does not cross `/`; use `**` for that.
pub(crate) fn build_glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern.trim_end_matches('/'))
        .literal_separator(true)
        .build()
}

fn build_set<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(build_glob(pattern)?);
    }
    builder.build()
}

/// A path matches when it or any of its parent directories matches
fn matches_path(set: &GlobSet, path: &str) -> bool {
    Path::new(path).ancestors().any(|candidate| {
        !candidate.as_os_str().is_empty() && set.is_match(candidate)
    })
}

fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', ']', '{', '}'])
}

/// Apply copy / symlink / ignore rules from `source` into `dest`
///
/// Individual copy or symlink failures are collected in
/// [`FileRulesOutcome::failures`]; only an unusable pattern or a failure to
/// list files from git is returned as an error.
pub fn apply_file_rules(
    source: &Path,
    dest: &Path,
    rules: &[FileRule],
    include_untracked: bool,
    progress: &Progress,
) -> Result<FileRulesOutcome, SpeckError> {
    let by_action = |action: FileAction| {
        rules
            .iter()
            .filter(move |rule| rule.action == action)
            .map(|rule| rule.pattern.as_str())
    };

    let invalid_pattern = |e: globset::Error| SpeckError::ConfigInvalid {
        path: config_path(source).display().to_string(),
        message: format!("invalid file rule pattern: {}", e),
    };
    let copy_set = build_set(by_action(FileAction::Copy)).map_err(invalid_pattern)?;
    let ignore_set = build_set(by_action(FileAction::Ignore)).map_err(invalid_pattern)?;

    let mut outcome = FileRulesOutcome::default();

    if by_action(FileAction::Copy).next().is_some() {
        let git = GitCli::new(source);
        let tracked = git
            .tracked_files()
            .map_err(|e| SpeckError::git(format!("listing tracked files in {}", source.display()), e))?;

        let mut selected: BTreeSet<String> = tracked
            .into_iter()
            .filter(|path| matches_path(&copy_set, path) && !matches_path(&ignore_set, path))
            .collect();

        if include_untracked {
            let untracked = git.untracked_files().map_err(|e| {
                SpeckError::git(format!("listing untracked files in {}", source.display()), e)
            })?;
            selected.extend(
                untracked
                    .into_iter()
                    .filter(|path| matches_path(&copy_set, path) && !matches_path(&ignore_set, path)),
            );
        }

        let selected: Vec<String> = selected.into_iter().collect();
        tracing::debug!(count = selected.len(), "copying files into worktree");
        copy_files(source, dest, &selected, &mut outcome, progress);
    }

    for pattern in by_action(FileAction::Symlink) {
        link_path(source, dest, pattern, &mut outcome, progress);
    }

    Ok(outcome)
}

fn copy_files(
    source: &Path,
    dest: &Path,
    files: &[String],
    outcome: &mut FileRulesOutcome,
    progress: &Progress,
) {
    let total = files.len();
    let mut done = 0;

    let mut run = || {
        for batch in files.chunks(COPY_BATCH_SIZE) {
            let results: Vec<(&String, io::Result<()>)> = batch
                .par_iter()
                .map(|relative| (relative, copy_one(source, dest, relative)))
                .collect();

            for (relative, result) in results {
                match result {
                    Ok(()) => outcome.copied.push(relative.clone()),
                    Err(e) => outcome.failures.push(FileRuleFailure {
                        path: relative.clone(),
                        action: FileAction::Copy,
                        message: e.to_string(),
                    }),
                }
            }
            done += batch.len();
            progress.emit(ProgressEvent::FilesCopied { done, total });
        }
    };

    match rayon::ThreadPoolBuilder::new()
        .num_threads(COPY_BATCH_SIZE)
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            tracing::debug!(error = %e, "could not build copy pool, using global pool");
            run();
        }
    }
}

fn copy_one(source: &Path, dest: &Path, relative: &str) -> io::Result<()> {
    let from = source.join(relative);
    let to = dest.join(relative);

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    let metadata = fs::symlink_metadata(&from)?;
    if metadata.file_type().is_symlink() {
        // Recreate tracked symlinks as-is instead of copying their targets.
        let target = fs::read_link(&from)?;
        if fs::symlink_metadata(&to).is_ok() {
            fs::remove_file(&to)?;
        }
        let target_is_dir = from.is_dir();
        return create_symlink(&target, &to, target_is_dir);
    }

    fs::copy(&from, &to)?;
    Ok(())
}

fn link_path(
    source: &Path,
    dest: &Path,
    pattern: &str,
    outcome: &mut FileRulesOutcome,
    progress: &Progress,
) {
    let relative = pattern.trim_end_matches('/');
    let mut fail = |message: String| {
        outcome.failures.push(FileRuleFailure {
            path: relative.to_string(),
            action: FileAction::Symlink,
            message,
        })
    };

    if is_glob_pattern(relative) {
        fail("symlink rules take a literal path, not a glob".to_string());
        return;
    }

    let target = source.join(relative);
    if !target.exists() {
        tracing::debug!(path = %target.display(), "symlink source absent, skipping");
        return;
    }

    let link = dest.join(relative);
    if fs::symlink_metadata(&link).is_ok() {
        fail(format!("{} already exists in the worktree", link.display()));
        return;
    }

    let Some(link_dir) = link.parent() else {
        fail("cannot determine link directory".to_string());
        return;
    };
    if let Err(e) = fs::create_dir_all(link_dir) {
        fail(e.to_string());
        return;
    }

    let relative_target = pathdiff::diff_paths(&target, link_dir).unwrap_or_else(|| target.clone());
    match create_symlink(&relative_target, &link, target.is_dir()) {
        Ok(()) => {
            progress.emit(ProgressEvent::Symlinked { link: link.clone() });
            outcome.symlinked.push(relative.to_string());
        }
        Err(e) => fail(e.to_string()),
    }
}

/// Create a symlink at `link` pointing to `target`
#[cfg(unix)]
pub(crate) fn create_symlink(target: &Path, link: &Path, _target_is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Create a symlink at `link` pointing to `target`
#[cfg(windows)]
pub(crate) fn create_symlink(target: &Path, link: &Path, target_is_dir: bool) -> io::Result<()> {
    if target_is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

//! Typed wrapper around the git CLI
//!
//! Every method shells out to `git -C <repo>` and translates the result into
//! [`GitError`]. Callers decide what a failure means; nothing here swallows
//! errors or retries.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Serialize;

use crate::error::GitError;

/// Minimum git version with `worktree list --porcelain` and `worktree remove`
pub const MIN_GIT_VERSION: (u32, u32) = (2, 15);

/// Parsed `git --version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
}

impl GitVersion {
    /// Parse output like "git version 2.39.3 (Apple Git-145)"
    pub fn parse(output: &str) -> Option<Self> {
        let version_part = output.split_whitespace().nth(2)?;
        let mut parts = version_part.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }

    pub fn supports_worktrees(&self) -> bool {
        (self.major, self.minor) >= MIN_GIT_VERSION
    }
}

/// One entry of `git worktree list --porcelain`
///
/// Always re-derived from git; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitWorktreeInfo {
    pub path: PathBuf,
    /// Short branch name (without `refs/heads/`), `None` when detached
    pub branch: Option<String>,
    /// Abbreviated HEAD commit
    pub commit: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub detached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bare: bool,
    /// Reason git considers this worktree stale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prunable: Option<String>,
}

/// Parse porcelain worktree output
///
/// A line-prefix state machine: `worktree ` opens a record, a blank line
/// closes it. Lines before the first record and unknown keys are ignored.
pub fn parse_worktree_list(output: &str) -> Vec<GitWorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<GitWorktreeInfo> = None;

    for line in output.lines() {
        if line.is_empty() {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            continue;
        }

        let (key, value) = match line.split_once(' ') {
            Some((k, v)) => (k, Some(v)),
            None => (line, None),
        };

        match (key, current.as_mut()) {
            ("worktree", _) => {
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                current = value.map(|path| GitWorktreeInfo {
                    path: PathBuf::from(path),
                    branch: None,
                    commit: String::new(),
                    detached: false,
                    bare: false,
                    prunable: None,
                });
            }
            ("HEAD", Some(wt)) => {
                wt.commit = value.unwrap_or_default().chars().take(7).collect();
            }
            ("branch", Some(wt)) => {
                wt.branch = value.map(|branch_ref| {
                    branch_ref
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch_ref)
                        .to_string()
                });
            }
            ("detached", Some(wt)) => wt.detached = true,
            ("bare", Some(wt)) => wt.bare = true,
            ("prunable", Some(wt)) => {
                wt.prunable = Some(value.unwrap_or("stale").to_string());
            }
            _ => {}
        }
    }

    if let Some(wt) = current {
        worktrees.push(wt);
    }

    worktrees
}

/// Git CLI wrapper bound to one repository
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn output<I, S>(&self, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        tracing::debug!(
            repo = %self.repo_root.display(),
            "git {}",
            args.iter()
                .map(|a| a.as_ref().to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(&args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::NotInstalled
                } else {
                    GitError::CommandFailed {
                        args: describe_args(&args),
                        stderr: e.to_string(),
                    }
                }
            })
    }

    /// Run git and return trimmed stdout, failing on non-zero exit
    fn run<I, S>(&self, args: I) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().collect();
        let output = self.output(&args)?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: describe_args(&args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Installed git version
    pub fn version(&self) -> Result<GitVersion, GitError> {
        let output = Command::new("git").arg("--version").output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::NotInstalled
            } else {
                GitError::CommandFailed {
                    args: "--version".to_string(),
                    stderr: e.to_string(),
                }
            }
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        GitVersion::parse(&stdout)
            .ok_or_else(|| GitError::UnexpectedOutput(stdout.trim().to_string()))
    }

    /// Fail unless git is new enough for worktree management
    pub fn ensure_worktree_support(&self) -> Result<GitVersion, GitError> {
        let version = self.version()?;
        if !version.supports_worktrees() {
            return Err(GitError::VersionTooOld {
                found: format!("{}.{}", version.major, version.minor),
            });
        }
        Ok(version)
    }

    /// Top-level directory of the working tree containing `repo_root`
    pub fn toplevel(&self) -> Result<PathBuf, GitError> {
        let output = self.output(["rev-parse", "--show-toplevel"])?;
        if !output.status.success() {
            return Err(GitError::NotARepository {
                path: self.repo_root.display().to_string(),
            });
        }
        Ok(PathBuf::from(
            String::from_utf8_lossy(&output.stdout).trim_end(),
        ))
    }

    /// Checked-out branch, `None` when HEAD is detached
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let branch = self.run(["rev-parse", "--abbrev-ref", "HEAD"])?;
        if branch == "HEAD" || branch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(branch))
        }
    }

    /// Whether `refs/heads/<branch>` resolves
    ///
    /// Exit status 1 from `rev-parse --verify --quiet` means "no such ref";
    /// any other failure is an error.
    pub fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{}", branch);
        let output = self.output(["rev-parse", "--verify", "--quiet", reference.as_str()])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                args: format!("rev-parse --verify --quiet {}", reference),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// All worktrees git knows about, including the main one
    pub fn list_worktrees(&self) -> Result<Vec<GitWorktreeInfo>, GitError> {
        let stdout = self.run(["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&stdout))
    }

    /// `git worktree add <path> <branch>`; the branch must already exist
    pub fn add_worktree(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        self.run([
            OsStr::new("worktree"),
            OsStr::new("add"),
            path.as_os_str(),
            OsStr::new(branch),
        ])?;
        Ok(())
    }

    /// `git worktree remove [--force] <path>`
    pub fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError> {
        let mut args = vec![OsStr::new("worktree"), OsStr::new("remove")];
        if force {
            args.push(OsStr::new("--force"));
        }
        args.push(path.as_os_str());
        self.run(args)?;
        Ok(())
    }

    /// `git worktree prune`
    pub fn prune_worktrees(&self) -> Result<(), GitError> {
        self.run(["worktree", "prune"])?;
        Ok(())
    }

    /// Delete a local branch; `force` uses `-D`
    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.run(["branch", flag, branch])?;
        Ok(())
    }

    /// Paths git tracks, relative to the repository root
    pub fn tracked_files(&self) -> Result<Vec<String>, GitError> {
        let stdout = self.run(["ls-files", "-z"])?;
        Ok(split_nul(&stdout))
    }

    /// Untracked paths that are not ignored, relative to the repository root
    pub fn untracked_files(&self) -> Result<Vec<String>, GitError> {
        let stdout = self.run(["ls-files", "-z", "--others", "--exclude-standard"])?;
        Ok(split_nul(&stdout))
    }
}

fn split_nul(stdout: &str) -> Vec<String> {
    stdout
        .split('\0')
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn describe_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

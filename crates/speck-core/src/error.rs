//! Error types for speck operations

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors produced at the git adapter boundary
///
/// The raw stderr of a failed git invocation is kept so it can be surfaced
/// for diagnostics after the error has been wrapped with operation context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// The git binary could not be spawned
    #[error("git is not installed or not on PATH")]
    NotInstalled,

    /// Installed git predates worktree support we rely on
    #[error("git {found} is too old (worktree support requires 2.15 or newer)")]
    VersionTooOld { found: String },

    /// The path is not inside a git working tree
    #[error("not a git repository: {path}")]
    NotARepository { path: String },

    /// git ran but exited unsuccessfully
    #[error("`git {args}` failed: {stderr}")]
    CommandFailed { args: String, stderr: String },

    /// git ran but printed something we could not understand
    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),
}

/// Broad error classes used for reporting and remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Bad input or repository state the user can fix
    User,
    /// Missing or inadequate tooling, disk space
    Environment,
    /// Symlink targets escaping into system locations
    Security,
    /// Mid-workflow failure after the worktree was created
    Fatal,
    /// Unexpected I/O or git failures
    Internal,
}

/// Why dependency installation failed, derived from the installer's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallFailureKind {
    PackageManagerMissing,
    MissingManifest,
    PermissionDenied,
    DiskSpace,
    Network,
    RegistryNotFound,
    MalformedManifest,
    Unknown,
}

impl InstallFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallFailureKind::PackageManagerMissing => "package-manager-missing",
            InstallFailureKind::MissingManifest => "missing-manifest",
            InstallFailureKind::PermissionDenied => "permission-denied",
            InstallFailureKind::DiskSpace => "disk-space",
            InstallFailureKind::Network => "network",
            InstallFailureKind::RegistryNotFound => "registry-404",
            InstallFailureKind::MalformedManifest => "malformed-manifest",
            InstallFailureKind::Unknown => "unknown",
        }
    }
}

/// Core error type for speck operations
#[derive(Error, Debug)]
pub enum SpeckError {
    // === Configuration errors (E001-E003) ===
    /// E001: config.json is not valid JSON or does not match the schema shape
    #[error("E001: failed to parse config {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// E002: config parsed but failed validation
    #[error("E002: invalid config {path}: {message}")]
    ConfigInvalid { path: String, message: String },

    /// E003: on-disk schema version differs from the supported one
    #[error("E003: config {path} has schema version {found}, expected {expected}")]
    ConfigVersion {
        path: String,
        found: String,
        expected: String,
    },

    // === User errors (E010-E015) ===
    /// E010: branch name violates git ref rules
    #[error("E010: invalid branch name '{branch}': {reason}")]
    InvalidBranchName { branch: String, reason: String },

    /// E011: branch must exist before a worktree can be created for it
    #[error("E011: branch '{branch}' does not exist")]
    BranchNotFound { branch: String },

    /// E012: another worktree already has this branch checked out
    #[error("E012: worktree already exists for branch '{branch}' at {path}")]
    WorktreeAlreadyExists { branch: String, path: String },

    /// E013: destination directory is occupied
    #[error("E013: destination path {path} already exists and is not empty")]
    PathOccupied { path: String },

    /// E014: removal target could not be resolved
    #[error("E014: No worktree found for branch '{branch}'")]
    WorktreeNotFound { branch: String },

    /// E015: computed or supplied path cannot host a worktree
    #[error("E015: invalid worktree path {path}: {reason}")]
    InvalidWorktreePath { path: String, reason: String },

    // === Environment errors (E020-E022) ===
    /// E020: git invocation failed
    #[error("E020: {context}: {source}")]
    Git {
        context: String,
        #[source]
        source: GitError,
    },

    /// E021: not enough free space for a new worktree
    #[error("E021: insufficient disk space at {path}: {available_mb} MB free, {required_mb} MB required")]
    InsufficientDiskSpace {
        path: String,
        available_mb: u64,
        required_mb: u64,
    },

    /// E022: dependency installation failed
    #[error("E022: dependency installation failed ({}): {message}", .kind.as_str())]
    DependencyInstall {
        kind: InstallFailureKind,
        message: String,
        suggestion: String,
        output: String,
    },

    // === Security errors (E030) ===
    /// E030: a speck symlink resolves somewhere it must never point
    #[error("E030: refusing symlink {link} -> {target}: {reason}")]
    SymlinkSecurity {
        link: String,
        target: String,
        reason: String,
    },

    /// E031: a speck symlink exists but its target does not
    #[error("E031: broken symlink {link} -> {target}")]
    BrokenSymlink { link: String, target: String },

    // === Incomplete workflow (E040) ===
    /// E040: git worktree add succeeded but a later fatal step failed
    #[error("E040: worktree for '{branch}' was created at {} but setup failed: {source}", .path.display())]
    WorktreeIncomplete {
        branch: String,
        path: PathBuf,
        #[source]
        source: Box<SpeckError>,
    },

    // === IO and system errors ===
    /// Filesystem operation failed with context
    #[error("failed to {action} {}: {source}", .path.display())]
    Fs {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpeckError {
    /// Wrap a git adapter failure with operation context
    pub fn git(context: impl Into<String>, source: GitError) -> Self {
        SpeckError::Git {
            context: context.into(),
            source,
        }
    }

    /// Wrap an io error with the action and path that produced it
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpeckError::Fs {
            action,
            path: path.into(),
            source,
        }
    }

    /// Get the error code (e.g., "E001", "E012")
    pub fn code(&self) -> &'static str {
        match self {
            SpeckError::ConfigParse { .. } => "E001",
            SpeckError::ConfigInvalid { .. } => "E002",
            SpeckError::ConfigVersion { .. } => "E003",
            SpeckError::InvalidBranchName { .. } => "E010",
            SpeckError::BranchNotFound { .. } => "E011",
            SpeckError::WorktreeAlreadyExists { .. } => "E012",
            SpeckError::PathOccupied { .. } => "E013",
            SpeckError::WorktreeNotFound { .. } => "E014",
            SpeckError::InvalidWorktreePath { .. } => "E015",
            SpeckError::Git { .. } => "E020",
            SpeckError::InsufficientDiskSpace { .. } => "E021",
            SpeckError::DependencyInstall { .. } => "E022",
            SpeckError::SymlinkSecurity { .. } => "E030",
            SpeckError::BrokenSymlink { .. } => "E031",
            SpeckError::WorktreeIncomplete { .. } => "E040",
            SpeckError::Fs { .. } => "E050",
        }
    }

    /// Classify this error for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            SpeckError::ConfigParse { .. }
            | SpeckError::ConfigInvalid { .. }
            | SpeckError::ConfigVersion { .. }
            | SpeckError::InvalidBranchName { .. }
            | SpeckError::BranchNotFound { .. }
            | SpeckError::WorktreeAlreadyExists { .. }
            | SpeckError::PathOccupied { .. }
            | SpeckError::WorktreeNotFound { .. }
            | SpeckError::InvalidWorktreePath { .. } => ErrorCategory::User,

            SpeckError::Git {
                source: GitError::NotInstalled | GitError::VersionTooOld { .. },
                ..
            }
            | SpeckError::InsufficientDiskSpace { .. } => ErrorCategory::Environment,
            SpeckError::DependencyInstall { .. } => ErrorCategory::Environment,

            SpeckError::SymlinkSecurity { .. } => ErrorCategory::Security,

            SpeckError::WorktreeIncomplete { .. } => ErrorCategory::Fatal,

            SpeckError::Git { .. }
            | SpeckError::BrokenSymlink { .. }
            | SpeckError::Fs { .. } => ErrorCategory::Internal,
        }
    }

    /// Remediation text for the user, if there is something actionable to say
    pub fn hint(&self) -> Option<String> {
        match self {
            SpeckError::ConfigParse { path, .. } | SpeckError::ConfigInvalid { path, .. } => {
                Some(format!("fix or delete {} and run `speck worktree init`", path))
            }
            SpeckError::ConfigVersion { .. } => {
                Some("run `speck worktree init` to migrate the config".to_string())
            }
            SpeckError::BranchNotFound { branch } => Some(format!(
                "create the branch first: git branch {}",
                branch
            )),
            SpeckError::WorktreeAlreadyExists { path, .. } => {
                Some(format!("use the existing worktree at {}", path))
            }
            SpeckError::PathOccupied { .. } => Some(
                "pass --force to replace the directory or --reuse to keep it".to_string(),
            ),
            SpeckError::WorktreeNotFound { .. } => {
                Some("run `speck worktree list` to see existing worktrees".to_string())
            }
            SpeckError::Git {
                source: GitError::NotInstalled,
                ..
            } => Some("install git 2.15 or newer and make sure it is on PATH".to_string()),
            SpeckError::Git {
                source: GitError::VersionTooOld { .. },
                ..
            } => Some("upgrade git to 2.15 or newer".to_string()),
            SpeckError::InsufficientDiskSpace { .. } => {
                Some("free up disk space or choose another --worktree-path".to_string())
            }
            SpeckError::DependencyInstall { suggestion, .. } => Some(suggestion.clone()),
            SpeckError::SymlinkSecurity { link, .. } => Some(format!(
                "remove {} and re-link to a project directory",
                link
            )),
            SpeckError::BrokenSymlink { link, .. } => {
                Some(format!("remove {} or run `speck link` again", link))
            }
            SpeckError::WorktreeIncomplete { branch, source, .. } => {
                let cleanup = format!(
                    "finish setup manually or remove it with `speck worktree remove --branch {}`",
                    branch
                );
                match source.hint() {
                    Some(inner) => Some(format!("{}; {}", inner, cleanup)),
                    None => Some(cleanup),
                }
            }
            _ => None,
        }
    }

    /// Raw git or installer output attached to this error, if any
    pub fn git_output(&self) -> Option<&str> {
        match self {
            SpeckError::Git {
                source: GitError::CommandFailed { stderr, .. },
                ..
            } => Some(stderr),
            SpeckError::DependencyInstall { output, .. } => Some(output),
            SpeckError::WorktreeIncomplete { source, .. } => source.git_output(),
            _ => None,
        }
    }
}

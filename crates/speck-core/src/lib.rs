//! speck-core: worktree lifecycle and speck root detection
//!
//! This crate holds everything the `speck` CLI does that touches a
//! repository: configuration, naming, git worktree management, file rules,
//! dependency installation, IDE launch and multi-repo root detection.

/// Error types for speck operations
pub mod error;

/// `.speck/config.json` loading, validation and persistence
pub mod config;

/// Worktree directory and branch naming
pub mod naming;

/// Typed wrapper around the git CLI
pub mod git;

/// Pre-flight checks
pub mod validation;

/// Copy / symlink / ignore rules for new worktrees
pub mod file_rules;

/// Package manager detection and installation
pub mod deps;

/// Editor detection and launch
pub mod ide;

/// Progress events for long-running operations
pub mod progress;

/// Create, remove, list and prune worktrees
pub mod worktree;

/// Single- vs multi-repo speck root detection
pub mod root;

// Re-exports for convenience
pub use config::{SpeckConfig, load_config, migrate_config, save_config};
pub use error::{ErrorCategory, GitError, SpeckError};
pub use progress::{Progress, ProgressEvent};
pub use root::{RootDetector, SpeckMode, SpeckRootConfig, detect_speck_root};
pub use worktree::{
    CreateWorktreeOptions, CreateWorktreeOutcome, RemoveWorktreeOptions, RemoveWorktreeOutcome,
    WorktreeMetadata, WorktreeStatus, create_worktree, list_worktrees, main_repository,
    prune_worktrees, remove_worktree,
};

//! CLI command implementations

pub mod init;
pub mod root;
pub mod worktree;

use std::path::{Path, PathBuf};

use speck_core::root::find_repo_root;
use speck_core::{GitError, SpeckError};

pub use init::run_init;
pub use root::{run_link, run_root};
pub use worktree::{
    CreateArgs, WorktreeCommands, run_create, run_launch_ide, run_list, run_prune, run_remove,
};

/// Repository root for `--repo-path`, defaulting to the current directory
pub fn resolve_repo_root(repo_path: Option<&Path>) -> Result<PathBuf, SpeckError> {
    let start = match repo_path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().map_err(|e| SpeckError::fs("read", ".", e))?,
    };
    find_repo_root(&start).ok_or_else(|| {
        SpeckError::git(
            "resolving repository",
            GitError::NotARepository {
                path: start.display().to_string(),
            },
        )
    })
}

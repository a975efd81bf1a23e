//! CLI argument parsing with clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::WorktreeCommands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Speck - spec-driven development with git worktree automation
#[derive(Parser)]
#[command(name = "speck")]
#[command(version = VERSION)]
#[command(about = "Spec-driven development workflow tooling with git worktree automation")]
#[command(long_about = "Speck manages git worktrees for feature work and locates the shared specs directory.\n\nWorktrees are created next to the main repository, populated from configurable file rules, and optionally get dependencies installed and an IDE opened.\n\nConfiguration lives in .speck/config.json at the repository root.")]
pub struct Cli {
    /// Increase output verbosity (debug logging, extra columns)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, remove, list and prune worktrees
    #[command(subcommand, long_about = "Git worktree lifecycle.\n\nSubcommands:\n  create      Create a worktree for an existing branch\n  remove      Remove the worktree for a branch\n  list        List worktrees of the repository\n  prune       Forget worktrees whose directories are gone\n  init        Write .speck/config.json\n  launch-ide  Open a worktree in the configured editor\n\nTypical workflow:\n  1. git branch feature/login\n  2. speck worktree create --branch feature/login\n  3. speck worktree remove --branch feature/login --delete-branch")]
    Worktree(WorktreeCommands),

    /// Show where specs live for the current directory
    ///
    /// Reports single-repo or multi-repo mode and the specs directory.
    #[command(long_about = "Show where specs live for the current directory.\n\nDetection order:\n  1. .speck/root symlink in the current directory\n  2. .speck/root symlink at the repository root (or the main repository for a worktree)\n  3. .speck-link-* markers at the repository root\n  4. otherwise single-repo mode")]
    Root,

    /// Link this repository to a shared speck root
    ///
    /// Writes .speck/root here and a .speck-link-<repo> marker in the speck root.
    Link {
        /// Directory that holds the shared specs/
        speck_root: PathBuf,
    },
}

/// Get the command args for use in the application
pub fn parse() -> Cli {
    Cli::parse()
}

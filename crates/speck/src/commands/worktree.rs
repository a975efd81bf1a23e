//! Worktree CLI commands
//!
//! Thin wrappers over `speck_core::worktree`: parse flags, run the
//! operation, then print either a human summary or a JSON envelope.

use std::path::PathBuf;

use clap::Subcommand;
use owo_colors::OwoColorize;
use serde::Serialize;
use speck_core::config::{Editor, WorktreeSettings, load_config};
use speck_core::git::GitWorktreeInfo;
use speck_core::ide::{IdeLaunchOutcome, detect_available_ides, launch_ide};
use speck_core::validation::DEFAULT_REQUIRED_DISK_MB;
use speck_core::worktree::PruneOutcome;
use speck_core::{
    CreateWorktreeOptions, RemoveWorktreeOptions, WorktreeMetadata, WorktreeStatus,
    create_worktree, list_worktrees, main_repository, prune_worktrees, remove_worktree,
};

use super::resolve_repo_root;
use crate::colors::COLORS;
use crate::output::{JsonResponse, OutputMode, print_warning, report_error};
use crate::progress::ProgressRenderer;

/// Worktree subcommands
#[derive(Subcommand, Debug)]
pub enum WorktreeCommands {
    /// Create a worktree for an existing branch
    ///
    /// The worktree is placed next to the main repository.
    #[command(
        long_about = "Create a worktree for an existing branch.\n\nSteps:\n  - prune stale worktree records\n  - check the branch exists and has no worktree yet\n  - check disk space and the destination directory\n  - git worktree add\n  - apply file rules (copy / symlink / ignore)\n  - install dependencies and open the IDE, if configured\n\nIf dependency installation fails the worktree is kept; remove it with `speck worktree remove`."
    )]
    Create {
        /// Branch to check out (the configured prefix is added if missing)
        #[arg(long)]
        branch: String,

        /// Repository to work in (default: current directory)
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// Create the worktree here instead of the computed sibling path
        #[arg(long)]
        worktree_path: Option<PathBuf>,

        /// Do not open the IDE
        #[arg(long)]
        no_ide: bool,

        /// Do not install dependencies
        #[arg(long)]
        no_deps: bool,

        /// Keep an existing, non-empty destination directory
        #[arg(long, conflicts_with = "force")]
        reuse: bool,

        /// Delete an existing destination directory first
        #[arg(long)]
        force: bool,

        /// Free space required at the destination, in MB
        #[arg(
            long,
            env = "SPECK_REQUIRED_DISK_MB",
            default_value_t = DEFAULT_REQUIRED_DISK_MB,
            hide = true
        )]
        required_disk_mb: u64,
    },

    /// Remove the worktree for a branch
    Remove {
        /// Branch whose worktree should be removed
        #[arg(long)]
        branch: String,

        /// Repository to work in (default: current directory)
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// Remove even with local changes; force-delete the branch
        #[arg(long)]
        force: bool,

        /// Delete the branch after removing the worktree
        #[arg(long)]
        delete_branch: bool,
    },

    /// List worktrees of the repository
    ///
    /// Use --verbose for commit, state and the effective worktree config.
    List {
        /// Repository to work in (default: current directory)
        #[arg(long)]
        repo_path: Option<PathBuf>,
    },

    /// Forget worktrees whose directories are gone
    Prune {
        /// Repository to work in (default: current directory)
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// Show what would be pruned without pruning
        #[arg(long)]
        dry_run: bool,
    },

    /// Write .speck/config.json
    ///
    /// Prompts for settings when run in a terminal without a preset.
    Init {
        /// Repository to work in (default: current directory)
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// Use the recommended settings without prompting
        #[arg(long, conflicts_with = "minimal")]
        defaults: bool,

        /// Enable worktrees with no file rules, installs or IDE launch
        #[arg(long)]
        minimal: bool,
    },

    /// Open a worktree in the configured editor
    LaunchIde {
        /// Worktree to open
        #[arg(long)]
        worktree_path: PathBuf,

        /// Repository whose config names the editor (default: current directory)
        #[arg(long)]
        repo_path: Option<PathBuf>,
    },
}

/// Flags for `worktree create`
#[derive(Debug)]
pub struct CreateArgs {
    pub branch: String,
    pub repo_path: Option<PathBuf>,
    pub worktree_path: Option<PathBuf>,
    pub no_ide: bool,
    pub no_deps: bool,
    pub reuse: bool,
    pub force: bool,
    pub required_disk_mb: u64,
}

/// JSON output for list command
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListData {
    pub worktrees: Vec<GitWorktreeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<WorktreeSettings>,
}

/// JSON output for launch-ide command
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchData {
    pub editor: Editor,
    pub outcome: IdeLaunchOutcome,
    pub available: Vec<Editor>,
}

/// Run worktree create command
pub fn run_create(args: CreateArgs, mode: OutputMode) -> anyhow::Result<u8> {
    const COMMAND: &str = "worktree create";

    let options = CreateWorktreeOptions {
        repo_path: match args.repo_path {
            Some(path) => path,
            None => std::env::current_dir()?,
        },
        branch: args.branch,
        worktree_path: args.worktree_path,
        skip_ide: args.no_ide,
        skip_deps: args.no_deps,
        reuse_existing: args.reuse,
        force: args.force,
        required_disk_mb: args.required_disk_mb,
    };

    let renderer = ProgressRenderer::start(mode);
    let result = create_worktree(&options, renderer.progress());
    renderer.finish();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let parent_repo =
                main_repository(&options.repo_path).unwrap_or_else(|_| options.repo_path.clone());
            let metadata = WorktreeMetadata::from_incomplete(&e, &parent_repo);
            return report_error(COMMAND, &e, metadata, mode);
        }
    };

    if mode.json {
        let warnings = outcome.warnings.clone();
        JsonResponse::ok(COMMAND, outcome, warnings).print()?;
    } else if !mode.quiet {
        let metadata = &outcome.metadata;
        let (mark, style) = match metadata.status {
            WorktreeStatus::Ready => ("✓", COLORS.success),
            _ => ("!", COLORS.warning),
        };
        println!(
            "{} Created worktree for {}",
            mark.style(style),
            metadata.branch_name.bold()
        );
        println!("  Path:   {}", metadata.worktree_path.display());
        println!("  Status: {}", format!("{:?}", metadata.status).to_lowercase());
        if !outcome.file_rules.copied.is_empty() || !outcome.file_rules.symlinked.is_empty() {
            println!(
                "  Files:  {} copied, {} symlinked",
                outcome.file_rules.copied.len(),
                outcome.file_rules.symlinked.len()
            );
        }
        if let Some(install) = &outcome.install {
            println!(
                "  Deps:   installed with {} in {:.1}s",
                install.package_manager,
                install.duration.as_secs_f64()
            );
        }
        if !outcome.warnings.is_empty() {
            println!();
            for warning in &outcome.warnings {
                print_warning(warning);
            }
        }
        println!();
        println!("  cd {}", metadata.worktree_path.display());
    }
    Ok(0)
}

/// Run worktree remove command
pub fn run_remove(
    branch: String,
    repo_path: Option<PathBuf>,
    force: bool,
    delete_branch: bool,
    mode: OutputMode,
) -> anyhow::Result<u8> {
    const COMMAND: &str = "worktree remove";

    let options = RemoveWorktreeOptions {
        repo_path: match repo_path {
            Some(path) => path,
            None => std::env::current_dir()?,
        },
        branch,
        force,
        delete_branch,
    };

    let renderer = ProgressRenderer::start(mode);
    let result = remove_worktree(&options, renderer.progress());
    renderer.finish();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => return report_error::<()>(COMMAND, &e, None, mode),
    };

    if mode.json {
        let warnings = outcome.warnings.clone();
        JsonResponse::ok(COMMAND, outcome, warnings).print()?;
    } else if !mode.quiet {
        println!(
            "{} Removed worktree {}",
            "✓".style(COLORS.success),
            outcome.worktree_path.display()
        );
        if outcome.used_fallback {
            println!("  git refused the removal; the directory was deleted directly");
        }
        if outcome.branch_deleted {
            println!("  Deleted branch {}", outcome.branch_name);
        }
        for warning in &outcome.warnings {
            print_warning(warning);
        }
    }
    Ok(0)
}

/// Run worktree list command
pub fn run_list(repo_path: Option<PathBuf>, mode: OutputMode) -> anyhow::Result<u8> {
    const COMMAND: &str = "worktree list";

    let repo_root = match resolve_repo_root(repo_path.as_deref()) {
        Ok(root) => root,
        Err(e) => return report_error::<()>(COMMAND, &e, None, mode),
    };
    let worktrees = list_worktrees(&repo_root);

    let config = if mode.verbose {
        match load_config(&repo_root) {
            Ok(config) => Some(config.worktree),
            Err(e) => return report_error::<()>(COMMAND, &e, None, mode),
        }
    } else {
        None
    };

    if mode.json {
        JsonResponse::ok(COMMAND, ListData { worktrees, config }, Vec::new()).print()?;
        return Ok(0);
    }
    if mode.quiet {
        return Ok(0);
    }

    if worktrees.is_empty() {
        println!("No worktrees");
        return Ok(0);
    }

    for wt in &worktrees {
        let branch = wt.branch.as_deref().unwrap_or("(detached)");
        if mode.verbose {
            let mut state = Vec::new();
            if wt.detached {
                state.push("detached".to_string());
            }
            if wt.bare {
                state.push("bare".to_string());
            }
            if let Some(reason) = &wt.prunable {
                state.push(format!("prunable: {}", reason));
            }
            println!(
                "{}  {}  {}  {}",
                wt.commit.style(COLORS.muted),
                branch.bold(),
                wt.path.display(),
                state.join(", ").style(COLORS.warning)
            );
        } else {
            println!("{}  {}", branch.bold(), wt.path.display());
        }
    }

    if let Some(settings) = config {
        println!();
        println!("{}", "Worktree config".style(COLORS.active).bold());
        println!("  enabled:          {}", settings.enabled);
        println!("  worktreePath:     {}", settings.worktree_path);
        println!(
            "  branchPrefix:     {}",
            settings.branch_prefix.as_deref().unwrap_or("(none)")
        );
        println!(
            "  ide:              {} (autoLaunch: {})",
            settings.ide.editor.as_str(),
            settings.ide.auto_launch
        );
        println!(
            "  dependencies:     autoInstall: {}",
            settings.dependencies.auto_install
        );
        println!("  file rules:       {}", settings.files.rules.len());
    }
    Ok(0)
}

/// Run worktree prune command
pub fn run_prune(repo_path: Option<PathBuf>, dry_run: bool, mode: OutputMode) -> anyhow::Result<u8> {
    const COMMAND: &str = "worktree prune";

    let result = resolve_repo_root(repo_path.as_deref())
        .and_then(|root| prune_worktrees(&root, dry_run));
    let outcome: PruneOutcome = match result {
        Ok(outcome) => outcome,
        Err(e) => return report_error::<()>(COMMAND, &e, None, mode),
    };

    if mode.json {
        JsonResponse::ok(COMMAND, outcome, Vec::new()).print()?;
    } else if !mode.quiet {
        if outcome.pruned_paths.is_empty() {
            println!("No stale worktrees");
        } else {
            let verb = if dry_run { "Would prune" } else { "Pruned" };
            println!("{} {} stale worktree(s):", verb, outcome.pruned_paths.len());
            for path in &outcome.pruned_paths {
                println!("  - {}", path.display());
            }
        }
    }
    Ok(0)
}

/// Run worktree launch-ide command
pub fn run_launch_ide(
    worktree_path: PathBuf,
    repo_path: Option<PathBuf>,
    mode: OutputMode,
) -> anyhow::Result<u8> {
    const COMMAND: &str = "worktree launch-ide";

    let settings = match resolve_repo_root(repo_path.as_deref()).and_then(|root| load_config(&root)) {
        Ok(config) => config.worktree,
        Err(e) => return report_error::<()>(COMMAND, &e, None, mode),
    };
    if !worktree_path.is_dir() {
        let e = speck_core::SpeckError::InvalidWorktreePath {
            path: worktree_path.display().to_string(),
            reason: "not a directory".to_string(),
        };
        return report_error::<()>(COMMAND, &e, None, mode);
    }

    let editor = settings.ide.editor;
    let outcome = launch_ide(editor, &worktree_path, settings.ide.new_window);
    let warning = outcome.warning();
    let available = if outcome.is_launched() {
        Vec::new()
    } else {
        detect_available_ides()
    };

    if mode.json {
        let data = LaunchData {
            editor,
            outcome,
            available,
        };
        let response = match &warning {
            None => JsonResponse::ok(COMMAND, data, Vec::new()),
            Some(message) => JsonResponse::failure(COMMAND, message.clone(), Some(data)),
        };
        response.print()?;
    } else if let Some(message) = &warning {
        eprintln!("{} {}", "error:".style(COLORS.fail).bold(), message);
        if available.is_empty() {
            eprintln!("  no supported editor was found on PATH");
        } else {
            let names: Vec<_> = available.iter().map(Editor::as_str).collect();
            eprintln!(
                "  {} available editors: {} (set worktree.ide.editor in .speck/config.json)",
                "hint:".style(COLORS.active),
                names.join(", ")
            );
        }
    } else if !mode.quiet {
        if let IdeLaunchOutcome::Launched { command } = &outcome {
            println!("{} Opened {}", "✓".style(COLORS.success), command);
        }
    }

    Ok(if warning.is_none() { 0 } else { 1 })
}

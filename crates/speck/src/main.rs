//! speck CLI - spec-driven development with git worktree automation

mod cli;
mod colors;
mod commands;
mod interaction;
mod output;
mod progress;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use cli::Commands;
use commands::WorktreeCommands;
use output::OutputMode;

/// Log filter variable, e.g. `SPECK_LOG=speck_core=debug`
const LOG_ENV: &str = "SPECK_LOG";

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    // stdout carries results (and JSON), so logs always go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = cli::parse();
    init_logging(cli.verbose);

    let mode = OutputMode {
        json: cli.json,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Some(Commands::Worktree(command)) => match command {
            WorktreeCommands::Create {
                branch,
                repo_path,
                worktree_path,
                no_ide,
                no_deps,
                reuse,
                force,
                required_disk_mb,
            } => commands::run_create(
                commands::CreateArgs {
                    branch,
                    repo_path,
                    worktree_path,
                    no_ide,
                    no_deps,
                    reuse,
                    force,
                    required_disk_mb,
                },
                mode,
            ),
            WorktreeCommands::Remove {
                branch,
                repo_path,
                force,
                delete_branch,
            } => commands::run_remove(branch, repo_path, force, delete_branch, mode),
            WorktreeCommands::List { repo_path } => commands::run_list(repo_path, mode),
            WorktreeCommands::Prune { repo_path, dry_run } => {
                commands::run_prune(repo_path, dry_run, mode)
            }
            WorktreeCommands::Init {
                repo_path,
                defaults,
                minimal,
            } => commands::run_init(repo_path, defaults, minimal, mode),
            WorktreeCommands::LaunchIde {
                worktree_path,
                repo_path,
            } => commands::run_launch_ide(worktree_path, repo_path, mode),
        },
        Some(Commands::Root) => commands::run_root(mode),
        Some(Commands::Link { speck_root }) => commands::run_link(speck_root, mode),
        None => {
            if !cli.quiet {
                println!("speck v{}", env!("CARGO_PKG_VERSION"));
                println!("Use --help for usage information");
            }
            Ok(0)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

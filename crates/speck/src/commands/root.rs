//! Implementation of the `speck root` and `speck link` commands

use std::path::PathBuf;

use owo_colors::OwoColorize;
use speck_core::{RootDetector, SpeckError, SpeckMode, SpeckRootConfig};

use crate::colors::COLORS;
use crate::output::{JsonResponse, OutputMode, report_error};

fn mode_label(mode: SpeckMode) -> &'static str {
    match mode {
        SpeckMode::SingleRepo => "single-repo",
        SpeckMode::MultiRepo => "multi-repo",
    }
}

fn current_dir() -> Result<PathBuf, SpeckError> {
    std::env::current_dir().map_err(|e| SpeckError::fs("read", ".", e))
}

fn print_config(config: &SpeckRootConfig) {
    println!("mode:       {}", mode_label(config.mode).style(COLORS.active));
    println!("speck root: {}", config.speck_root.display());
    println!("repo root:  {}", config.repo_root.display());
    println!("specs dir:  {}", config.specs_dir.display());
}

fn finish(command: &str, config: SpeckRootConfig, mode: OutputMode) -> anyhow::Result<u8> {
    if mode.json {
        JsonResponse::ok(command, config, Vec::new()).print()?;
    } else if !mode.quiet {
        print_config(&config);
    }
    Ok(0)
}

/// Show where specs live for the current directory
pub fn run_root(mode: OutputMode) -> anyhow::Result<u8> {
    let detected = current_dir().and_then(|cwd| RootDetector::new(cwd).detect().cloned());
    match detected {
        Ok(config) => finish("root", config, mode),
        Err(e) => report_error::<()>("root", &e, None, mode),
    }
}

/// Link the current repository to a shared speck root
pub fn run_link(speck_root: PathBuf, mode: OutputMode) -> anyhow::Result<u8> {
    let linked = current_dir().and_then(|cwd| RootDetector::new(cwd).link(&speck_root).cloned());
    match linked {
        Ok(config) => {
            if mode.human() {
                println!(
                    "{} Linked to {}",
                    "✓".style(COLORS.success),
                    config.speck_root.display()
                );
            }
            finish("link", config, mode)
        }
        Err(e) => report_error::<()>("link", &e, None, mode),
    }
}

//! Implementation of the `speck worktree init` command
//!
//! Writes `.speck/config.json` from a preset or from interactive answers.
//! An existing config in an older schema is migrated instead of replaced.

use std::path::PathBuf;

use owo_colors::OwoColorize;
use serde::Serialize;
use speck_core::config::{
    Editor, FileAction, FileRule, PackageManagerPreference, SpeckConfig, config_path,
    load_config, migrate_config, save_config,
};

use super::resolve_repo_root;
use crate::colors::COLORS;
use crate::interaction::{CliAdapter, InteractionError};
use crate::output::{JsonResponse, OutputMode, report_error};

const COMMAND: &str = "worktree init";

const PACKAGE_MANAGERS: [PackageManagerPreference; 5] = [
    PackageManagerPreference::Auto,
    PackageManagerPreference::Npm,
    PackageManagerPreference::Pnpm,
    PackageManagerPreference::Yarn,
    PackageManagerPreference::Bun,
];

/// Where the written config came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSource {
    Recommended,
    Minimal,
    Interactive,
    /// Config already existed in the current schema
    Existing,
    /// Config existed in an older schema and was rewritten
    Migrated,
}

/// Data payload for init command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitData {
    pub config_path: PathBuf,
    pub source: InitSource,
    pub config: SpeckConfig,
}

fn package_manager_name(pm: PackageManagerPreference) -> &'static str {
    match pm {
        PackageManagerPreference::Auto => "auto (detect from lockfile)",
        PackageManagerPreference::Npm => "npm",
        PackageManagerPreference::Pnpm => "pnpm",
        PackageManagerPreference::Yarn => "yarn",
        PackageManagerPreference::Bun => "bun",
    }
}

/// Build a config from prompts, starting from the recommended preset
fn prompt_config(adapter: &CliAdapter) -> Result<SpeckConfig, InteractionError> {
    let mut config = SpeckConfig::recommended();
    let settings = &mut config.worktree;

    settings.enabled = adapter.ask_confirm("Use worktrees for new features?", true)?;

    let prefix = adapter.ask_text("Branch prefix (e.g. \"alice/\", empty for none)", "")?;
    let prefix = prefix.trim();
    settings.branch_prefix = (!prefix.is_empty()).then(|| prefix.to_string());

    let editors: Vec<&str> = Editor::ALL.iter().map(Editor::as_str).collect();
    let editor = adapter.ask_select("Editor", &editors, 0)?;
    settings.ide.editor = Editor::ALL[editor];
    settings.ide.auto_launch =
        adapter.ask_confirm("Open the editor after creating a worktree?", false)?;

    settings.dependencies.auto_install =
        adapter.ask_confirm("Install dependencies in new worktrees?", false)?;
    if settings.dependencies.auto_install {
        let names: Vec<&str> = PACKAGE_MANAGERS.iter().map(|pm| package_manager_name(*pm)).collect();
        let choice = adapter.ask_select("Package manager", &names, 0)?;
        settings.dependencies.package_manager = PACKAGE_MANAGERS[choice];
    }

    let share = adapter.ask_confirm("Symlink node_modules from the main checkout?", true)?;
    if !share {
        settings
            .files
            .rules
            .retain(|rule| rule != &FileRule::new("node_modules", FileAction::Symlink));
    }
    settings.files.include_untracked =
        adapter.ask_confirm("Also copy untracked files matching copy rules?", true)?;

    Ok(config)
}

/// Run the init command
pub fn run_init(
    repo_path: Option<PathBuf>,
    defaults: bool,
    minimal: bool,
    mode: OutputMode,
) -> anyhow::Result<u8> {
    let repo_root = match resolve_repo_root(repo_path.as_deref()) {
        Ok(root) => root,
        Err(e) => return report_error::<()>(COMMAND, &e, None, mode),
    };
    let path = config_path(&repo_root);
    let preset_requested = defaults || minimal;

    // An existing config is kept unless a preset explicitly replaces it.
    if path.exists() && !preset_requested {
        let result = migrate_config(&repo_root).and_then(|migrated| {
            load_config(&repo_root).map(|config| (migrated, config))
        });
        return match result {
            Ok((migrated, config)) => {
                let source = if migrated {
                    InitSource::Migrated
                } else {
                    InitSource::Existing
                };
                finish(InitData { config_path: path, source, config }, mode)
            }
            Err(e) => report_error::<()>(COMMAND, &e, None, mode),
        };
    }

    let (config, source) = if minimal {
        (SpeckConfig::minimal(), InitSource::Minimal)
    } else if defaults || mode.json {
        (SpeckConfig::recommended(), InitSource::Recommended)
    } else {
        let adapter = CliAdapter::new();
        if !adapter.is_tty() {
            (SpeckConfig::recommended(), InitSource::Recommended)
        } else {
            match prompt_config(&adapter) {
                Ok(config) => (config, InitSource::Interactive),
                Err(InteractionError::Cancelled) => {
                    eprintln!("cancelled, nothing written");
                    return Ok(1);
                }
                Err(e) => anyhow::bail!("prompt failed: {}", e),
            }
        }
    };

    if let Err(e) = save_config(&repo_root, &config) {
        return report_error::<()>(COMMAND, &e, None, mode);
    }
    finish(InitData { config_path: path, source, config }, mode)
}

fn finish(data: InitData, mode: OutputMode) -> anyhow::Result<u8> {
    if mode.json {
        JsonResponse::ok(COMMAND, data, Vec::new()).print()?;
        return Ok(0);
    }
    if mode.quiet {
        return Ok(0);
    }

    let verb = match data.source {
        InitSource::Existing => "Config already up to date:",
        InitSource::Migrated => "Migrated config:",
        _ => "Wrote config:",
    };
    println!("{} {} {}", "✓".style(COLORS.success), verb, data.config_path.display());

    let settings = &data.config.worktree;
    println!("  worktrees enabled: {}", settings.enabled);
    println!("  worktree path:     {}", settings.worktree_path);
    if let Some(prefix) = &settings.branch_prefix {
        println!("  branch prefix:     {}", prefix);
    }
    println!(
        "  file rules:        {}",
        settings
            .files
            .rules
            .iter()
            .map(|rule| format!("{} ({})", rule.pattern, rule.action.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_tty_prompt_is_refused() {
        let adapter = CliAdapter::with_tty(false);
        assert!(matches!(
            prompt_config(&adapter),
            Err(InteractionError::NonTty)
        ));
    }

    #[test]
    fn test_init_data_serialization() {
        let data = InitData {
            config_path: PathBuf::from("/repo/.speck/config.json"),
            source: InitSource::Minimal,
            config: SpeckConfig::minimal(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["source"], "minimal");
        assert_eq!(json["config"]["worktree"]["enabled"], true);
        assert_eq!(json["configPath"], "/repo/.speck/config.json");
    }
}

//! Configuration handling for speck
//!
//! The config lives at `<repo>/.speck/config.json`. A missing file means
//! built-in defaults; a malformed or invalid file is an error that names
//! the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SpeckError;
use crate::file_rules::build_glob;
use crate::naming::render_worktree_dir_template;
use crate::validation::branch_name_problem;

/// Current config schema version
pub const CONFIG_SCHEMA_VERSION: &str = "1.0";

/// Directory holding speck state inside a repository
pub const SPECK_DIR: &str = ".speck";

/// Config file name within [`SPECK_DIR`]
pub const CONFIG_FILE: &str = "config.json";

/// Default worktree directory template: the layout-aware sibling name
pub const DEFAULT_WORKTREE_PATH: &str = "{name}";

/// Path of the config file for a repository root
pub fn config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(SPECK_DIR).join(CONFIG_FILE)
}

/// Speck configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeckConfig {
    /// Schema version, must equal [`CONFIG_SCHEMA_VERSION`]
    pub version: String,

    /// Worktree behavior
    #[serde(default)]
    pub worktree: WorktreeSettings,
}

/// Worktree settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeSettings {
    /// Whether speck commands should create worktrees for new features
    #[serde(default)]
    pub enabled: bool,

    /// Directory-name template for new worktrees (sibling of the repo)
    #[serde(default = "default_worktree_path")]
    pub worktree_path: String,

    /// Prefix prepended to branch names, e.g. `"username/"`
    #[serde(default)]
    pub branch_prefix: Option<String>,

    #[serde(default)]
    pub ide: IdeSettings,

    #[serde(default)]
    pub dependencies: DependencySettings,

    #[serde(default)]
    pub files: FileSettings,
}

/// Supported editors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Editor {
    Vscode,
    Cursor,
    Webstorm,
    Idea,
    Pycharm,
}

impl Editor {
    pub const ALL: [Editor; 5] = [
        Editor::Vscode,
        Editor::Cursor,
        Editor::Webstorm,
        Editor::Idea,
        Editor::Pycharm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Editor::Vscode => "vscode",
            Editor::Cursor => "cursor",
            Editor::Webstorm => "webstorm",
            Editor::Idea => "idea",
            Editor::Pycharm => "pycharm",
        }
    }
}

/// IDE launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeSettings {
    #[serde(default)]
    pub auto_launch: bool,

    #[serde(default = "default_editor")]
    pub editor: Editor,

    #[serde(default = "default_true")]
    pub new_window: bool,
}

impl Default for IdeSettings {
    fn default() -> Self {
        Self {
            auto_launch: false,
            editor: default_editor(),
            new_window: true,
        }
    }
}

/// Package manager choice in config; `auto` means detect from lockfiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerPreference {
    Npm,
    Yarn,
    Pnpm,
    Bun,
    Auto,
}

/// Dependency install settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySettings {
    #[serde(default)]
    pub auto_install: bool,

    #[serde(default = "default_package_manager")]
    pub package_manager: PackageManagerPreference,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            auto_install: false,
            package_manager: default_package_manager(),
        }
    }
}

/// What a file rule does with matching paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Copy,
    Symlink,
    Ignore,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Copy => "copy",
            FileAction::Symlink => "symlink",
            FileAction::Ignore => "ignore",
        }
    }
}

/// A pattern + action pair governing how paths reach a new worktree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRule {
    pub pattern: String,
    pub action: FileAction,
}

impl FileRule {
    pub fn new(pattern: &str, action: FileAction) -> Self {
        Self {
            pattern: pattern.to_string(),
            action,
        }
    }
}

/// File materialization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSettings {
    #[serde(default)]
    pub rules: Vec<FileRule>,

    #[serde(default)]
    pub include_untracked: bool,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            rules: default_file_rules(),
            include_untracked: true,
        }
    }
}

fn default_worktree_path() -> String {
    DEFAULT_WORKTREE_PATH.to_string()
}

fn default_editor() -> Editor {
    Editor::Vscode
}

fn default_package_manager() -> PackageManagerPreference {
    PackageManagerPreference::Auto
}

fn default_true() -> bool {
    true
}

fn default_file_rules() -> Vec<FileRule> {
    vec![
        FileRule::new(".env", FileAction::Copy),
        FileRule::new(".env.*", FileAction::Copy),
        FileRule::new("node_modules", FileAction::Symlink),
    ]
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            worktree_path: default_worktree_path(),
            branch_prefix: None,
            ide: IdeSettings::default(),
            dependencies: DependencySettings::default(),
            files: FileSettings::default(),
        }
    }
}

impl Default for SpeckConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION.to_string(),
            worktree: WorktreeSettings::default(),
        }
    }
}

impl SpeckConfig {
    /// Preset written by `init --defaults`: worktrees on, default rules
    pub fn recommended() -> Self {
        let mut config = Self::default();
        config.worktree.enabled = true;
        config
    }

    /// Preset written by `init --minimal`: worktrees on, nothing extra
    pub fn minimal() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION.to_string(),
            worktree: WorktreeSettings {
                enabled: true,
                files: FileSettings {
                    rules: Vec::new(),
                    include_untracked: false,
                },
                ..WorktreeSettings::default()
            },
        }
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.version != CONFIG_SCHEMA_VERSION {
            return Err(format!(
                "version must be \"{}\", found \"{}\"",
                CONFIG_SCHEMA_VERSION, self.version
            ));
        }

        let template = self.worktree.worktree_path.trim();
        if template.is_empty() {
            return Err("worktree.worktreePath must not be empty".to_string());
        }
        let rendered = render_worktree_dir_template(template, "repo", "branch", "repo-branch");
        if rendered.contains(['/', '\\']) || rendered == "." || rendered == ".." {
            return Err(format!(
                "worktree.worktreePath \"{}\" must resolve to a single directory name",
                template
            ));
        }

        if let Some(prefix) = &self.worktree.branch_prefix {
            // A prefix is only ever used in front of a branch name, so check
            // it the way git would see it there.
            let probe = format!("{}x", prefix);
            if let Some(problem) = branch_name_problem(&probe) {
                return Err(format!(
                    "worktree.branchPrefix \"{}\" is not usable: {}",
                    prefix, problem
                ));
            }
        }

        for (index, rule) in self.worktree.files.rules.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                return Err(format!("worktree.files.rules[{}] has an empty pattern", index));
            }
            if let Err(e) = build_glob(&rule.pattern) {
                return Err(format!(
                    "worktree.files.rules[{}] pattern \"{}\" is invalid: {}",
                    index, rule.pattern, e
                ));
            }
        }

        Ok(())
    }
}

/// Load the config for a repository
///
/// A missing file yields [`SpeckConfig::default`]. Invalid JSON, a schema
/// mismatch or a failed validation is an error naming the file.
pub fn load_config(repo_root: &Path) -> Result<SpeckConfig, SpeckError> {
    let path = config_path(repo_root);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(SpeckConfig::default());
    }

    let content = fs::read_to_string(&path).map_err(|e| SpeckError::fs("read", &path, e))?;
    let raw: Value = serde_json::from_str(&content).map_err(|e| SpeckError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let found = raw
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("<missing>");
    if found != CONFIG_SCHEMA_VERSION {
        return Err(SpeckError::ConfigVersion {
            path: path.display().to_string(),
            found: found.to_string(),
            expected: CONFIG_SCHEMA_VERSION.to_string(),
        });
    }

    let config: SpeckConfig =
        serde_json::from_value(raw).map_err(|e| SpeckError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    config.validate().map_err(|message| SpeckError::ConfigInvalid {
        path: path.display().to_string(),
        message,
    })?;

    Ok(config)
}

/// Validate and write the config, creating `.speck/` if needed
pub fn save_config(repo_root: &Path, config: &SpeckConfig) -> Result<(), SpeckError> {
    let path = config_path(repo_root);
    config.validate().map_err(|message| SpeckError::ConfigInvalid {
        path: path.display().to_string(),
        message,
    })?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| SpeckError::fs("create directory", dir, e))?;
    }

    let mut content =
        serde_json::to_string_pretty(config).map_err(|e| SpeckError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    content.push('\n');

    fs::write(&path, content).map_err(|e| SpeckError::fs("write", &path, e))?;
    tracing::debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Rewrite an older config in the current schema
///
/// Returns `false` when there is nothing to do (no file, or already
/// current). Older files are merged over the defaults so unknown or missing
/// keys fall back cleanly.
pub fn migrate_config(repo_root: &Path) -> Result<bool, SpeckError> {
    let path = config_path(repo_root);
    if !path.exists() {
        return Ok(false);
    }

    let content = fs::read_to_string(&path).map_err(|e| SpeckError::fs("read", &path, e))?;
    let raw: Value = serde_json::from_str(&content).map_err(|e| SpeckError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if raw.get("version").and_then(Value::as_str) == Some(CONFIG_SCHEMA_VERSION) {
        return Ok(false);
    }

    let mut merged =
        serde_json::to_value(SpeckConfig::default()).map_err(|e| SpeckError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    merge_json(&mut merged, raw);
    merged["version"] = Value::String(CONFIG_SCHEMA_VERSION.to_string());

    let config: SpeckConfig =
        serde_json::from_value(merged).map_err(|e| SpeckError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    save_config(repo_root, &config)?;
    tracing::info!(path = %path.display(), "migrated config to schema {}", CONFIG_SCHEMA_VERSION);
    Ok(true)
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else replaces
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

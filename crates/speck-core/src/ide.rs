//! Editor detection and detached launch
//!
//! Launching an editor never blocks and never fails the caller: every
//! problem comes back as an [`IdeLaunchOutcome`] variant.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::config::Editor;

/// How an editor CLI is asked to open a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchStyle {
    /// VS Code family: `-n` opens a new window
    Editor,
    /// JetBrains family: `nosplash` skips the splash screen
    JetBrains,
}

/// CLI command used to open each editor
pub fn ide_command(editor: Editor) -> &'static str {
    match editor {
        Editor::Vscode => "code",
        Editor::Cursor => "cursor",
        Editor::Webstorm => "webstorm",
        Editor::Idea => "idea",
        Editor::Pycharm => "pycharm",
    }
}

fn launch_style(editor: Editor) -> LaunchStyle {
    match editor {
        Editor::Vscode | Editor::Cursor => LaunchStyle::Editor,
        Editor::Webstorm | Editor::Idea | Editor::Pycharm => LaunchStyle::JetBrains,
    }
}

/// Arguments passed before the path
fn launch_args(editor: Editor, new_window: bool) -> Vec<&'static str> {
    match launch_style(editor) {
        LaunchStyle::Editor if new_window => vec!["-n"],
        LaunchStyle::Editor => Vec::new(),
        LaunchStyle::JetBrains => vec!["nosplash"],
    }
}

pub fn is_ide_available(editor: Editor) -> bool {
    which::which(ide_command(editor)).is_ok()
}

/// Editors whose CLI is on PATH, in [`Editor::ALL`] order
pub fn detect_available_ides() -> Vec<Editor> {
    Editor::ALL
        .into_iter()
        .filter(|editor| is_ide_available(*editor))
        .collect()
}

/// Result of a launch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum IdeLaunchOutcome {
    Launched { command: String },
    Unavailable { command: String },
    SpawnFailed { command: String, message: String },
}

impl IdeLaunchOutcome {
    pub fn is_launched(&self) -> bool {
        matches!(self, IdeLaunchOutcome::Launched { .. })
    }

    /// Warning text for anything but a successful launch
    pub fn warning(&self) -> Option<String> {
        match self {
            IdeLaunchOutcome::Launched { .. } => None,
            IdeLaunchOutcome::Unavailable { command } => {
                Some(format!("IDE command '{}' was not found on PATH", command))
            }
            IdeLaunchOutcome::SpawnFailed { command, message } => {
                Some(format!("failed to launch '{}': {}", command, message))
            }
        }
    }
}

/// Open `path` in `editor` without waiting for it
pub fn launch_ide(editor: Editor, path: &Path, new_window: bool) -> IdeLaunchOutcome {
    let name = ide_command(editor);
    let Ok(program) = which::which(name) else {
        return IdeLaunchOutcome::Unavailable {
            command: name.to_string(),
        };
    };

    let args = launch_args(editor, new_window);
    let command_line = format!("{} {} {}", name, args.join(" "), path.display())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut command = Command::new(program);
    command
        .args(&args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group, so closing the terminal does not take the editor with it.
        command.process_group(0);
    }

    match command.spawn() {
        Ok(mut child) => {
            tracing::debug!(command = %command_line, pid = child.id(), "launched IDE");
            // Reap in the background so a short-lived launcher does not linger as a zombie.
            std::thread::spawn(move || {
                let _ = child.wait();
            });
            IdeLaunchOutcome::Launched {
                command: command_line,
            }
        }
        Err(e) => IdeLaunchOutcome::SpawnFailed {
            command: command_line,
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_by_family() {
        assert_eq!(launch_args(Editor::Vscode, true), vec!["-n"]);
        assert!(launch_args(Editor::Cursor, false).is_empty());
        assert_eq!(launch_args(Editor::Idea, true), vec!["nosplash"]);
        assert_eq!(launch_args(Editor::Pycharm, false), vec!["nosplash"]);
    }

    #[test]
    fn test_outcome_warning() {
        let launched = IdeLaunchOutcome::Launched {
            command: "code -n /tmp/x".to_string(),
        };
        assert!(launched.is_launched());
        assert!(launched.warning().is_none());

        let missing = IdeLaunchOutcome::Unavailable {
            command: "webstorm".to_string(),
        };
        assert!(missing.warning().unwrap().contains("webstorm"));
    }

    #[test]
    fn test_detected_ides_are_available() {
        for editor in detect_available_ides() {
            assert!(is_ide_available(editor));
        }
    }
}

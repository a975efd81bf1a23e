//! JSON envelope and shared error reporting

use std::io::Write;

use owo_colors::OwoColorize;
use serde::Serialize;
use speck_core::{ErrorCategory, SpeckError};

use crate::colors::COLORS;

/// Global output flags, passed to every command
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

impl OutputMode {
    /// Whether human-readable output should be printed
    pub fn human(&self) -> bool {
        !self.json && !self.quiet
    }
}

/// JSON response envelope
///
/// Every `--json` invocation prints exactly one of these to stdout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonResponse<T> {
    pub success: bool,
    /// Command that generated this response, e.g. "worktree create"
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code (e.g., "E011")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error class: user, environment, security, fatal or internal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Raw git or installer output behind the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_output: Option<String>,
}

impl<T> JsonResponse<T> {
    /// Create a successful response
    pub fn ok(command: &str, data: T, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            command: command.to_string(),
            data: Some(data),
            warnings,
            error: None,
            code: None,
            category: None,
            hint: None,
            git_output: None,
        }
    }

    /// Create an error response from a speck error
    pub fn from_error(command: &str, error: &SpeckError, data: Option<T>) -> Self {
        Self {
            success: false,
            command: command.to_string(),
            data,
            warnings: Vec::new(),
            error: Some(error.to_string()),
            code: Some(error.code().to_string()),
            category: Some(error.category()),
            hint: error.hint(),
            git_output: error.git_output().map(str::to_string),
        }
    }

    /// Create an error response without a speck error behind it
    pub fn failure(command: &str, message: String, data: Option<T>) -> Self {
        Self {
            success: false,
            command: command.to_string(),
            data,
            warnings: Vec::new(),
            error: Some(message),
            code: None,
            category: None,
            hint: None,
            git_output: None,
        }
    }
}

impl<T: Serialize> JsonResponse<T> {
    pub fn print(&self) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, self)?;
        writeln!(stdout)?;
        Ok(())
    }
}

/// Print a warning line to stderr
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "warning:".style(COLORS.warning).bold(), message);
}

/// Report a failed command and return its exit code
pub fn report_error<T: Serialize>(
    command: &str,
    error: &SpeckError,
    data: Option<T>,
    mode: OutputMode,
) -> anyhow::Result<u8> {
    if mode.json {
        JsonResponse::from_error(command, error, data).print()?;
        return Ok(1);
    }

    eprintln!("{} {}", "error:".style(COLORS.fail).bold(), error);
    if error.category() == ErrorCategory::Fatal {
        eprintln!(
            "  {} the worktree was left on disk in an incomplete state",
            "note:".style(COLORS.warning)
        );
    }
    if let Some(hint) = error.hint() {
        eprintln!("  {} {}", "hint:".style(COLORS.active), hint);
    }
    if mode.verbose {
        if let Some(output) = error.git_output() {
            eprintln!("{}", output.dimmed());
        }
    }
    Ok(1)
}

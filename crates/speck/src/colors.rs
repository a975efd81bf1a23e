//! Semantic color theme for terminal output
//!
//! - `ACTIVE` => blue - progress steps, hints, headers
//! - `SUCCESS` => green - completed operations
//! - `WARNING` => yellow - degraded outcomes, non-fatal problems
//! - `FAIL` => red - errors

use std::sync::LazyLock;

use owo_colors::Style;

/// Semantic color definitions for terminal output
pub struct SemanticColors {
    pub active: Style,
    pub success: Style,
    pub warning: Style,
    pub fail: Style,
    /// Secondary detail such as commit hashes and installer output
    pub muted: Style,
}

impl Default for SemanticColors {
    fn default() -> Self {
        Self {
            active: Style::new().blue(),
            success: Style::new().green(),
            warning: Style::new().yellow(),
            fail: Style::new().red(),
            muted: Style::new().dimmed(),
        }
    }
}

/// Global default theme
pub static COLORS: LazyLock<SemanticColors> = LazyLock::new(SemanticColors::default);

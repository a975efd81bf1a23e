//! Terminal prompts using dialoguer
//!
//! `CliAdapter` asks questions with a spaced-out theme and refuses to prompt
//! when stdin is not a terminal, so scripted runs never hang.

use std::fmt::Write as FmtWrite;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use console::Style;
use dialoguer::theme::Theme;
use dialoguer::{Confirm, Input, Select};

use super::{InteractionError, InteractionResult};

/// Global flag to track if Ctrl+C was pressed
static CANCELLED: AtomicBool = AtomicBool::new(false);

fn is_cancelled() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

/// Set up the global Ctrl+C handler
pub fn setup_ctrl_c_handler() {
    static HANDLER_SET: AtomicBool = AtomicBool::new(false);

    if HANDLER_SET.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Err(e) = ctrlc::set_handler(move || {
        CANCELLED.store(true, Ordering::SeqCst);
        eprintln!();
    }) {
        tracing::warn!("could not set Ctrl+C handler: {}", e);
    }
}

/// Custom theme with generous spacing between elements
struct SpacedTheme {
    prompt_style: Style,
    active_style: Style,
    inactive_style: Style,
    hint_style: Style,
}

impl SpacedTheme {
    fn new() -> Self {
        Self {
            prompt_style: Style::new().cyan().bold(),
            active_style: Style::new().cyan(),
            inactive_style: Style::new(),
            hint_style: Style::new().dim(),
        }
    }

    fn prompt(&self, prompt: &str) -> String {
        self.prompt_style.apply_to(format!("? {}", prompt)).to_string()
    }
}

impl Theme for SpacedTheme {
    fn format_prompt(&self, f: &mut dyn FmtWrite, prompt: &str) -> std::fmt::Result {
        write!(f, "{}", self.prompt(prompt))
    }

    fn format_input_prompt(
        &self,
        f: &mut dyn FmtWrite,
        prompt: &str,
        default: Option<&str>,
    ) -> std::fmt::Result {
        match default {
            Some(d) if !d.is_empty() => write!(
                f,
                "{} {}",
                self.prompt(prompt),
                self.hint_style.apply_to(format!("({})", d))
            ),
            _ => write!(f, "{}", self.prompt(prompt)),
        }
    }

    fn format_input_prompt_selection(
        &self,
        f: &mut dyn FmtWrite,
        prompt: &str,
        sel: &str,
    ) -> std::fmt::Result {
        write!(f, "{} {}", self.prompt(prompt), self.active_style.apply_to(sel))
    }

    fn format_confirm_prompt(
        &self,
        f: &mut dyn FmtWrite,
        prompt: &str,
        default: Option<bool>,
    ) -> std::fmt::Result {
        let hint = match default {
            Some(true) => "(Y/n)",
            Some(false) => "(y/N)",
            None => "(y/n)",
        };
        write!(f, "{} {}", self.prompt(prompt), self.hint_style.apply_to(hint))
    }

    fn format_confirm_prompt_selection(
        &self,
        f: &mut dyn FmtWrite,
        prompt: &str,
        selection: Option<bool>,
    ) -> std::fmt::Result {
        let answer = match selection {
            Some(true) => "Yes",
            Some(false) => "No",
            None => "?",
        };
        write!(f, "{} {}", self.prompt(prompt), self.active_style.apply_to(answer))
    }

    fn format_select_prompt(&self, f: &mut dyn FmtWrite, prompt: &str) -> std::fmt::Result {
        write!(f, "{}", self.prompt(prompt))
    }

    fn format_select_prompt_selection(
        &self,
        f: &mut dyn FmtWrite,
        prompt: &str,
        sel: &str,
    ) -> std::fmt::Result {
        write!(f, "{} {}", self.prompt(prompt), self.active_style.apply_to(sel))
    }

    fn format_select_prompt_item(
        &self,
        f: &mut dyn FmtWrite,
        text: &str,
        active: bool,
    ) -> std::fmt::Result {
        writeln!(f)?;
        if active {
            write!(
                f,
                "  {} {}",
                self.active_style.apply_to(">"),
                self.active_style.apply_to(text)
            )
        } else {
            write!(f, "    {}", self.inactive_style.apply_to(text))
        }
    }
}

/// Prompt adapter for the terminal
pub struct CliAdapter {
    is_tty: bool,
}

impl CliAdapter {
    pub fn new() -> Self {
        setup_ctrl_c_handler();
        Self {
            is_tty: std::io::stdin().is_terminal(),
        }
    }

    #[cfg(test)]
    pub fn with_tty(is_tty: bool) -> Self {
        Self { is_tty }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    fn check_ready(&self) -> InteractionResult<()> {
        if !self.is_tty {
            return Err(InteractionError::NonTty);
        }
        if is_cancelled() {
            return Err(InteractionError::Cancelled);
        }
        Ok(())
    }

    fn convert(err: dialoguer::Error) -> InteractionError {
        if is_cancelled() {
            InteractionError::Cancelled
        } else {
            InteractionError::Io(err.to_string())
        }
    }

    /// Free text; an empty answer is allowed
    pub fn ask_text(&self, prompt: &str, default: &str) -> InteractionResult<String> {
        self.check_ready()?;
        let theme = SpacedTheme::new();
        Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .default(default.to_string())
            .allow_empty(true)
            .interact_text()
            .map_err(Self::convert)
    }

    pub fn ask_select(&self, prompt: &str, options: &[&str], default: usize) -> InteractionResult<usize> {
        self.check_ready()?;
        if options.is_empty() {
            return Err(InteractionError::InvalidInput(
                "options cannot be empty".to_string(),
            ));
        }

        let theme = SpacedTheme::new();
        println!();
        Select::with_theme(&theme)
            .with_prompt(prompt)
            .items(options)
            .default(default.min(options.len() - 1))
            .interact()
            .map_err(Self::convert)
    }

    pub fn ask_confirm(&self, prompt: &str, default: bool) -> InteractionResult<bool> {
        self.check_ready()?;
        let theme = SpacedTheme::new();
        Confirm::with_theme(&theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(Self::convert)
    }
}

impl Default for CliAdapter {
    fn default() -> Self {
        Self::new()
    }
}

//! Renders core progress events on stderr
//!
//! The orchestrator runs on the main thread; this renderer drains the
//! progress channel on its own thread until every sender is dropped.

use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use speck_core::progress::OutputStream;
use speck_core::{Progress, ProgressEvent};

use crate::colors::COLORS;
use crate::output::{OutputMode, print_warning};

/// Longest installer line shown next to the spinner
const SPINNER_LINE_WIDTH: usize = 60;

/// A progress handle plus the thread rendering it
pub struct ProgressRenderer {
    progress: Progress,
    handle: Option<JoinHandle<()>>,
}

impl ProgressRenderer {
    /// Start rendering, or return a silent handle when nothing should be shown
    pub fn start(mode: OutputMode) -> Self {
        if !mode.human() {
            return Self {
                progress: Progress::silent(),
                handle: None,
            };
        }

        let (progress, rx) = Progress::channel();
        let handle = std::thread::spawn(move || render(rx, mode.verbose));
        Self {
            progress,
            handle: Some(handle),
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Drop the sender and wait until every event has been printed
    pub fn finish(self) {
        let Self { progress, handle } = self;
        drop(progress);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::debug!("progress renderer panicked");
            }
        }
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg} [{elapsed}]")
    {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn truncate(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= SPINNER_LINE_WIDTH {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(SPINNER_LINE_WIDTH - 1).collect();
        format!("{}…", head)
    }
}

fn render(rx: Receiver<ProgressEvent>, verbose: bool) {
    let mut install: Option<(ProgressBar, String)> = None;

    for event in rx {
        match event {
            ProgressEvent::Step(message) => {
                eprintln!("{} {}", "→".style(COLORS.active), message);
            }
            ProgressEvent::Warning(message) => match &install {
                Some((pb, _)) => pb.suspend(|| print_warning(&message)),
                None => print_warning(&message),
            },
            ProgressEvent::FilesCopied { done, total } => {
                if done == total {
                    eprintln!("  copied {} file(s)", total);
                }
            }
            ProgressEvent::Symlinked { link } => {
                if verbose {
                    eprintln!("  linked {}", link.display().style(COLORS.muted));
                }
            }
            ProgressEvent::InstallStarted { package_manager } => {
                let label = format!("{} install", package_manager);
                install = Some((spinner(label.clone()), label));
            }
            ProgressEvent::InstallOutput { stream, line } => {
                if let Some((pb, label)) = &install {
                    if verbose {
                        let prefix = match stream {
                            OutputStream::Stdout => " ",
                            OutputStream::Stderr => "!",
                        };
                        pb.println(format!("  {} {}", prefix, line.style(COLORS.muted)));
                    }
                    if !line.trim().is_empty() {
                        pb.set_message(format!("{}: {}", label, truncate(&line)));
                    }
                }
            }
            ProgressEvent::InstallFinished { success } => {
                if let Some((pb, label)) = install.take() {
                    let elapsed = format!("{:.1}s", pb.elapsed().as_secs_f64());
                    pb.finish_and_clear();
                    if success {
                        eprintln!("{} {} [{}]", "✓".style(COLORS.success), label, elapsed);
                    } else {
                        eprintln!("{} {} [{}]", "✗".style(COLORS.fail), label, elapsed);
                    }
                }
            }
            ProgressEvent::IdeLaunched { command } => {
                eprintln!("{} opened {}", "✓".style(COLORS.success), command);
            }
        }
    }

    if let Some((pb, _)) = install {
        pb.finish_and_clear();
    }
}

//! Progress events emitted while worktrees are created and removed
//!
//! Long-running operations report through a single channel instead of
//! per-layer callbacks. The consumer decides how (or whether) to render.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::deps::PackageManager;

/// Which stream an installer output line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single progress notification
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A workflow step started
    Step(String),
    /// A non-fatal problem was recorded
    Warning(String),
    /// File rules copied `done` of `total` files so far
    FilesCopied { done: usize, total: usize },
    /// A symlink rule was materialized
    Symlinked { link: PathBuf },
    /// Dependency installation started
    InstallStarted { package_manager: PackageManager },
    /// One line of installer output
    InstallOutput { stream: OutputStream, line: String },
    /// Dependency installation finished
    InstallFinished { success: bool },
    /// An IDE was launched against the worktree
    IdeLaunched { command: String },
}

/// Cloneable sender side of the progress channel
///
/// A silent handle drops every event, which is what library callers and
/// tests use when they do not care about progress.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<Sender<ProgressEvent>>,
}

impl Progress {
    /// Create a connected handle and the receiver to drain it
    pub fn channel() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A handle that discards everything
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening anymore.
            let _ = tx.send(event);
        }
    }

    pub fn step(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(step = %message);
        self.emit(ProgressEvent::Step(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(ProgressEvent::Warning(message));
    }
}

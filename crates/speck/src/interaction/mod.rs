//! CLI interaction module
//!
//! Interactive prompts for `speck worktree init`, backed by dialoguer.

mod cli_adapter;

pub use cli_adapter::CliAdapter;

use thiserror::Error;

/// Why a prompt produced no answer
#[derive(Error, Debug)]
pub enum InteractionError {
    #[error("cancelled")]
    Cancelled,

    #[error("stdin is not a terminal")]
    NonTty,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("terminal error: {0}")]
    Io(String),
}

pub type InteractionResult<T> = Result<T, InteractionError>;

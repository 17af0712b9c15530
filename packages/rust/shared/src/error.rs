//! Error types for SecQ.
//!
//! Library crates use [`SecqError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SecQ operations.
#[derive(Debug, thiserror::Error)]
pub enum SecqError {
    /// Configuration loading or validation error (including a missing API key).
    #[error("config error: {message}")]
    Config { message: String },

    /// A run was requested with nothing to process.
    #[error("empty input: {message}")]
    EmptyInput { message: String },

    /// Generation service failure (transport, quota, or malformed response).
    #[error("generation error: {0}")]
    Generation(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record with the given id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record with the given id already exists.
    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    /// Another generation run is already in flight.
    #[error("a generation run is already in progress")]
    GenerationInProgress,

    /// A generation run stopped part-way through the question list.
    #[error("generation aborted at question {question_id} after {generated} answer(s): {source}")]
    RunAborted {
        generated: usize,
        question_id: String,
        #[source]
        source: Box<SecqError>,
    },

    /// Import file parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (blank fields, invalid values, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SecqError>;

impl SecqError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an empty-input error from any displayable message.
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying failure, looking through [`SecqError::RunAborted`].
    pub fn root(&self) -> &SecqError {
        match self {
            Self::RunAborted { source, .. } => source.root(),
            other => other,
        }
    }
}

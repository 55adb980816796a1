//! Error types for keyline
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using KeylineError
pub type Result<T> = std::result::Result<T, KeylineError>;

/// Unified error type for keyline operations
#[derive(Debug, Error)]
pub enum KeylineError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Malformed index file {}: {reason}", path.display())]
    MalformedIndex { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Decode error at offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    #[error("Encode error: {0}")]
    Encode(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

impl KeylineError {
    pub(crate) fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        KeylineError::NotFound {
            what,
            path: path.into(),
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        KeylineError::MalformedIndex {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for [`KeylineError::Cancelled`]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KeylineError::Cancelled)
    }

    /// True for a missing data file, index file or directory
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeylineError::NotFound { .. })
    }
}

//! Common error types for DUET-Screen

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for DUET-Screen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error conditions shared by every pipeline stage
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while writing a record or snapshot
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A file a stage depends on does not exist
    #[error("{what} missing: {}", path.display())]
    MissingPrerequisite { what: String, path: PathBuf },

    /// A persisted or user-supplied row could not be understood
    #[error("Malformed record in {} (line {line}): {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn missing(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::MissingPrerequisite {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

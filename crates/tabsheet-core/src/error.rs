//! Error types for tabsheet-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tabsheet-core
///
/// Lookup misses (unknown row ID or header on a read path) are never errors;
/// they surface as `None` or empty results.
#[derive(Debug, Error)]
pub enum Error {
    /// The sheet's shape would be violated (rectangularity, ID column, row keys)
    #[error("structural error: {0}")]
    Structural(String),

    /// A column specification token could not be parsed
    #[error("column '{0}' cannot be parsed")]
    InvalidColumn(String),

    /// Unknown merge mode
    #[error("merge mode '{0}' is invalid (expected overwrite, append, smart_append or add)")]
    InvalidMergeMode(String),

    /// Malformed cell write/read/remove entries
    #[error("invalid cell edit: {0}")]
    InvalidCellEdit(String),

    /// An operation was called with an unusable combination of arguments
    #[error("invalid call: {0}")]
    InvalidCall(String),

    /// Replacement output headers do not match the number of output columns
    #[error("output headers given do not match number of output columns ({expected}): found {found}")]
    HeaderMismatch { expected: usize, found: usize },

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Error::Structural(message.into())
    }

    /// True for errors that come from the engine itself rather than the I/O boundary
    pub fn is_engine_error(&self) -> bool {
        !matches!(
            self,
            Error::FileRead { .. } | Error::Csv { .. } | Error::WalkDir(_) | Error::Io(_) | Error::Json(_)
        )
    }

    /// True if the reader on the other end of an output stream went away
    pub fn is_broken_pipe(&self) -> bool {
        let io = match self {
            Error::Io(e) => Some(e),
            Error::Csv { source, .. } => match source.kind() {
                csv::ErrorKind::Io(e) => Some(e),
                _ => None,
            },
            _ => None,
        };
        io.is_some_and(|e| e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

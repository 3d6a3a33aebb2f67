//! Storage error types
//!
//! Storage errors are per-request and recoverable: the failed statement's
//! driver message is surfaced to the caller and nothing is retried.

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Connection was released by an administrative close
    #[error("Storage connection is closed")]
    Closed,

    /// The engine rejected the statement
    #[error("{0}")]
    Backend(String),

    /// The blocking worker running the statement did not complete
    #[error("Storage worker failed: {0}")]
    Join(String),
}

impl StorageError {
    /// Stable error code for logs
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Closed => "GATE_STORAGE_CLOSED",
            StorageError::Backend(_) => "GATE_STORAGE_ERROR",
            StorageError::Join(_) => "GATE_STORAGE_WORKER",
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

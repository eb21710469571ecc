//! Storage error types.

use std::io;
use thiserror::Error;

/// Blob storage operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error during storage operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Blob not found
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Stored name is not a single safe file name
    #[error("Invalid stored name: {0}")]
    InvalidName(String),

    /// Storage backend error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
            || matches!(self, StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

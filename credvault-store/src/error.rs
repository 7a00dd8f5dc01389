//! Storage error types.

use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the user/credential store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Uniqueness constraint violated (duplicate username). Concurrent
    /// registrations race here; the loser receives this error.
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("storage error: {0}")]
    Internal(String),
}

//! Error types for the store module.

use medledger_core::{CoreError, ResourceKey};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value failed to decode.
    #[error("corrupt stored value: {0}")]
    Corrupt(#[from] CoreError),

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(ResourceKey),

    /// Invalid data in storage or in a value about to be stored.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// The blocking worker running a query did not complete.
    #[error("blocking task failed: {0}")]
    TaskFailed(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Error types for the ledger module.

use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger rejected the transaction.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// No response within the allotted time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection-level failure talking to the ledger node.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid argument for a ledger call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

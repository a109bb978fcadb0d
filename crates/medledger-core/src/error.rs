//! Error types for medledger Core.

use thiserror::Error;

use crate::crypto::Digest;

/// Errors raised by pure computations over records, trees and permission sets.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tree cannot be built over zero records.
    #[error("cannot build a Merkle tree over an empty record set")]
    EmptyInput,

    /// The requested leaf is not part of the tree.
    #[error("leaf {0} not found in tree")]
    LeafNotFound(Digest),

    #[error("unknown subject type: {0}")]
    UnknownSubjectType(String),

    #[error("unknown permission kind: {0}")]
    UnknownPermissionKind(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

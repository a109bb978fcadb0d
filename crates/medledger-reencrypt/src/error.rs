//! Error types for the re-encryption module.

use thiserror::Error;

/// Errors that can occur talking to the re-encryption service.
#[derive(Debug, Error)]
pub enum ReEncryptError {
    /// The request never got a response (connect failure, timeout, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an error status.
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// The service answered with a body we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No key pair exists for this user.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The owner never granted this grantee access.
    #[error("{grantee} is not authorized to decrypt records of {owner}")]
    NotAuthorized { owner: String, grantee: String },

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption error, including a malformed capsule.
    #[error("decryption error: {0}")]
    Decryption(String),
}

/// Result type for re-encryption operations.
pub type Result<T> = std::result::Result<T, ReEncryptError>;

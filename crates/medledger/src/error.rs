//! Error taxonomy for medledger operations.
//!
//! Every error maps onto one of five [`ErrorKind`]s. The kind tells a caller
//! what to do next: fix the request, give up, raise an incident, retry, or
//! run reconciliation.

use std::fmt;
use std::time::Duration;

use medledger_core::{CoreError, MerkleRoot, PermissionKey, PermissionKind, ResourceKey};
use medledger_ledger::LedgerError;
use medledger_reencrypt::ReEncryptError;
use medledger_store::StoreError;
use thiserror::Error;

/// What a caller should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input; nothing happened. Fix and resend.
    Validation,
    /// Permission denied. Terminal for this request.
    Authorization,
    /// On-chain and off-chain state disagree. Never retried automatically.
    IntegrityMismatch,
    /// A collaborator failed before any irreversible write. Retry with backoff.
    Upstream,
    /// The record was written but its root was not published. Run
    /// reconciliation, not the whole operation.
    PartialCommit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::IntegrityMismatch => "integrity mismatch",
            ErrorKind::Upstream => "upstream service",
            ErrorKind::PartialCommit => "partial commit",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during medledger operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Missing or invalid request field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The referenced record does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(ResourceKey),

    /// No off-chain permission set for the requester.
    #[error("no permission set for {0}")]
    PermissionSetNotFound(PermissionKey),

    /// The requester's permission set does not include the required grant.
    #[error("{key} lacks {required}")]
    NotAuthorized {
        key: PermissionKey,
        required: PermissionKind,
    },

    /// Off-chain data disagrees with its ledger commitment.
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),

    /// Pure computation failed.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Re-encryption service error.
    #[error("re-encryption error: {0}")]
    ReEncrypt(#[from] ReEncryptError),

    /// An external call did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The record store changed, or may have, but the new root was not published.
    #[error("partial commit (unpublished root {}): {source}", display_root(.root))]
    PartialCommit {
        /// The root that failed to publish, if it was computed.
        root: Option<MerkleRoot>,
        #[source]
        source: Box<KernelError>,
    },
}

fn display_root(root: &Option<MerkleRoot>) -> String {
    root.map_or_else(|| "not computed".to_string(), |r| r.to_hex())
}

impl KernelError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::InvalidRequest(_)
            | KernelError::Config(_)
            | KernelError::RecordNotFound(_) => ErrorKind::Validation,
            KernelError::PermissionSetNotFound(_) | KernelError::NotAuthorized { .. } => {
                ErrorKind::Authorization
            }
            KernelError::IntegrityMismatch(_) => ErrorKind::IntegrityMismatch,
            KernelError::Core(e) => match e {
                CoreError::EmptyInput
                | CoreError::UnknownSubjectType(_)
                | CoreError::UnknownPermissionKind(_)
                | CoreError::InvalidDigest(_) => ErrorKind::Validation,
                // A record in the store whose leaf is not in the tree built
                // from that same store: the store moved under us.
                CoreError::LeafNotFound(_) => ErrorKind::IntegrityMismatch,
                CoreError::DecodingError(_) => ErrorKind::Upstream,
            },
            KernelError::Store(_)
            | KernelError::Ledger(_)
            | KernelError::ReEncrypt(_)
            | KernelError::Timeout { .. } => ErrorKind::Upstream,
            KernelError::PartialCommit { .. } => ErrorKind::PartialCommit,
        }
    }

    /// Wrap an error raised after the store may already have changed.
    pub(crate) fn partial_commit(root: Option<MerkleRoot>, source: KernelError) -> Self {
        KernelError::PartialCommit {
            root,
            source: Box::new(source),
        }
    }
}

/// Result type for medledger operations.
pub type Result<T> = std::result::Result<T, KernelError>;

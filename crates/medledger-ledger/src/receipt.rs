//! Values returned by ledger writes and registry reads.

use medledger_core::Digest;
use serde::{Deserialize, Serialize};

/// Proof that a write transaction was mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: Digest,
    /// Block the transaction was included in.
    pub block_number: u64,
}

/// Identity data attached to a minted subject token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    /// Account address that owns the token.
    pub address: String,
    pub name: String,
    pub surname: String,
    /// National tax / fiscal code.
    pub tax_code: String,
}

impl SubjectProfile {
    /// Create a new profile.
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        surname: impl Into<String>,
        tax_code: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            surname: surname.into(),
            tax_code: tax_code.into(),
        }
    }
}

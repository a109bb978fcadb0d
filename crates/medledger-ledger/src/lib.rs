//! # medledger ledger
//!
//! Typed interface to the ledger's commitments.
//!
//! ## Overview
//!
//! The ledger holds three things this system relies on:
//!
//! - **Root slot**: the Merkle root of the current off-chain record set
//! - **Permission slots**: one hash per `(subject_type, token_id, scope_id)`
//! - **Subject registry**: identity tokens minted per subject type
//!
//! Reads are calls; writes submit a transaction and wait for its
//! [`TxReceipt`]. The ledger can also verify an inclusion proof against its
//! own stored root, which callers use as an independent check next to the
//! local verification.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medledger_core::{Digest, MerkleRoot};
//! use medledger_ledger::{LedgerClient, MemoryLedger};
//!
//! async fn example() -> medledger_ledger::Result<()> {
//!     let ledger = MemoryLedger::new();
//!     let receipt = ledger.set_root(MerkleRoot(Digest::hash(b"leaf"))).await?;
//!     assert_eq!(receipt.block_number, 1);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod receipt;

pub use client::{memory::MemoryLedger, verify_sorted_path, LedgerClient};
pub use error::{LedgerError, Result};
pub use receipt::{SubjectProfile, TxReceipt};

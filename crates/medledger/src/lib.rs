//! # medledger
//!
//! The integrity and access-commitment layer for encrypted medical records.
//!
//! ## Overview
//!
//! Record plaintext never reaches this layer's store. Records are encrypted by
//! an external re-encryption service and persisted off-chain, while two kinds
//! of commitment are anchored on a ledger:
//!
//! - **Merkle root**: one root over every stored record payload
//! - **Permission hashes**: one hash per `(subject_type, token_id, scope_id)`
//!   over the canonical grant set
//!
//! The [`Orchestrator`] drives every write through
//! `encrypt → persist → recommit` and refuses to read or modify a record while
//! the store disagrees with the ledger.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use medledger::core::{PermissionKey, PermissionKind, SubjectType};
//! use medledger::ledger::MemoryLedger;
//! use medledger::reencrypt::ReEncryptionClient;
//! use medledger::store::SqliteStore;
//! use medledger::{AddRecordRequest, AssignPermissionRequest, KernelConfig, Orchestrator};
//!
//! async fn example() -> medledger::Result<()> {
//!     let config = KernelConfig::from_env()?;
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(SqliteStore::open("records.db")?),
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(config.reencrypt_client()?),
//!         config,
//!     );
//!     orchestrator.reencrypt().generate_keys("patient-1").await?;
//!
//!     let doctor = PermissionKey::new(SubjectType::Doctor, 7, 3);
//!     orchestrator
//!         .assign_permission(AssignPermissionRequest {
//!             key: doctor,
//!             grants: [PermissionKind::Read, PermissionKind::Write].into_iter().collect(),
//!         })
//!         .await?;
//!
//!     let written = orchestrator
//!         .add_record(AddRecordRequest {
//!             requester: doctor,
//!             resource_type: "Observation".into(),
//!             owner_id: "patient-1".into(),
//!             grantee_ids: vec![],
//!             plaintext: "{\"resourceType\":\"Observation\"}".into(),
//!         })
//!         .await?;
//!     println!("committed {} as {}", written.key, written.new_root);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Semantics
//!
//! Every error carries an [`ErrorKind`]. Only [`ErrorKind::PartialCommit`]
//! means state changed without its commitment: the record is stored, or a
//! timed-out write may still land, and no root covering it was published.
//! Recover with [`Orchestrator::reconcile`] rather than repeating the write.
//!
//! ## Re-exports
//!
//! - `medledger::core` - Digests, record and permission types, Merkle trees
//! - `medledger::store` - Record and permission storage, SQLite
//! - `medledger::ledger` - Ledger client contract
//! - `medledger::reencrypt` - Re-encryption service contract and clients

pub mod config;
pub mod error;
pub mod merkle;
pub mod orchestrator;
pub mod permissions;
pub mod request;
mod timeout;

// Re-export component crates
pub use medledger_core as core;
pub use medledger_ledger as ledger;
pub use medledger_reencrypt as reencrypt;
pub use medledger_store as store;

// Re-export main types for convenience
pub use config::KernelConfig;
pub use error::{ErrorKind, KernelError, Result};
pub use merkle::{CommitOutcome, IntegrityReport, MerkleCommitmentEngine};
pub use orchestrator::{Orchestrator, Stage};
pub use permissions::PermissionCommitmentEngine;
pub use request::{
    user_id, AccessRecordRequest, AddRecordRequest, AssignPermissionRequest, ReadOutcome,
    RegisterSubjectRequest, Registration, UpdateRecordRequest, WriteOutcome,
};

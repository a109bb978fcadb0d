//! # medledger Testkit
//!
//! Testing utilities for medledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a fully wired orchestrator over in-memory collaborators
//! - **Faults**: wrappers that make the ledger, the re-encryption service or
//!   the store fail on demand
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use medledger_core::{PermissionKind, SubjectType};
//! use medledger_testkit::faults::LedgerFault;
//! use medledger_testkit::fixtures::{observation, Harness};
//!
//! async fn example() -> medledger::Result<()> {
//!     let harness = Harness::new();
//!     let patient = harness.enroll(SubjectType::Patient, 1, &[PermissionKind::Read]).await?;
//!     let doctor = harness.enroll(SubjectType::Doctor, 1, &PermissionKind::ALL).await?;
//!
//!     harness.add(&doctor, &patient, &observation(1)).await?;
//!
//!     harness.ledger.arm(LedgerFault::SetRootHangs).await;
//!     let err = harness.add(&doctor, &patient, &observation(2)).await.unwrap_err();
//!     println!("{} ({})", err, err.kind());
//!     Ok(())
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use medledger_testkit::generators::record_set;
//!
//! proptest! {
//!     #[test]
//!     fn every_record_is_provable(records in record_set(32)) {
//!         // ...
//!     }
//! }
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;

pub use faults::{
    FaultyLedger, FaultyReEncryption, FaultyStore, LedgerFault, ReEncryptFault, StoreFault,
};
pub use fixtures::{test_config, Harness, Participant, TestOrchestrator};

//! # medledger store
//!
//! Off-chain storage for encrypted record versions and permission sets.
//!
//! ## Overview
//!
//! Two async traits split the concerns: [`RecordStore`] holds encrypted
//! records keyed by `(resource_type, resource_id, version_id)` and supports
//! the full scan the Merkle engine rebuilds from; [`PermissionStore`] holds
//! one grant set per `(subject_type, token_id, scope_id)`. Anything that
//! implements both is a [`Store`].
//!
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! tests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medledger_core::{EncryptedBlob, Record, ResourceKey};
//! use medledger_store::{RecordStore, SqliteStore};
//!
//! async fn example() -> medledger_store::Result<()> {
//!     let store = SqliteStore::open("records.db")?;
//!
//!     let key = ResourceKey::new("Patient", "p-1", 1);
//!     let record = Record::new(key.clone(), EncryptedBlob::new(vec![1], vec![2]));
//!     store.put_record(&record).await?;
//!
//!     let all = store.scan_records().await?;
//!     assert_eq!(all.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Upserts**: `put_record` replaces the payload of an existing key in place
//!   and reports which of the two happened.
//! - **Unordered scans**: callers must not rely on `scan_records` order.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PermissionStore, PutResult, RecordStore, Store, StoreExt};

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

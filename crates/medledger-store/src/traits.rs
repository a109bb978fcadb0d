//! Store traits: the abstract interface for off-chain persistence.
//!
//! The orchestrator is storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;
use medledger_core::{PermissionKey, PermissionSet, Record, ResourceKey};

use crate::error::{Result, StoreError};

/// Result of writing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// No record existed at this key.
    Inserted,
    /// An existing record's payload was replaced in place.
    Replaced,
}

/// Async interface for encrypted record persistence.
///
/// For SQLite, implementations use `spawn_blocking` internally to avoid
/// blocking the runtime.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Point Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by its identity.
    async fn get_record(&self, key: &ResourceKey) -> Result<Option<Record>>;

    /// Insert a record, or replace the payload of an existing one.
    async fn put_record(&self, record: &Record) -> Result<PutResult>;

    /// Check if a record exists.
    async fn has_record(&self, key: &ResourceKey) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk Operations (for tree rebuilds)
    // ─────────────────────────────────────────────────────────────────────────

    /// Every stored record, in no particular order.
    async fn scan_records(&self) -> Result<Vec<Record>>;

    /// Number of stored records.
    async fn record_count(&self) -> Result<u64>;
}

/// Async interface for the off-chain permission table.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Get the permission set for a key.
    async fn get_permissions(&self, key: &PermissionKey) -> Result<Option<PermissionSet>>;

    /// Create or overwrite the permission set at its key.
    async fn put_permissions(&self, set: &PermissionSet) -> Result<()>;
}

/// A backend holding both records and permissions.
pub trait Store: RecordStore + PermissionStore {}

impl<T: RecordStore + PermissionStore + ?Sized> Store for T {}

/// Extension trait for common store patterns.
pub trait StoreExt: RecordStore {
    /// Get a record, treating absence as an error.
    fn require_record(
        &self,
        key: &ResourceKey,
    ) -> impl std::future::Future<Output = Result<Record>> + Send;
}

impl<S: RecordStore + ?Sized> StoreExt for S {
    async fn require_record(&self, key: &ResourceKey) -> Result<Record> {
        self.get_record(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }
}

//! In-memory implementation of the store traits.
//!
//! Primarily for testing. Same semantics as SQLite, no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use medledger_core::{EncryptedBlob, PermissionKey, PermissionSet, Record, ResourceKey};

use crate::error::{Result, StoreError};
use crate::traits::{PermissionStore, PutResult, RecordStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Record payloads by identity. A hash map, so scans come back unordered.
    records: HashMap<ResourceKey, EncryptedBlob>,

    /// Permission sets by key.
    permissions: HashMap<PermissionKey, PermissionSet>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_record(&self, key: &ResourceKey) -> Result<Option<Record>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .get(key)
            .map(|payload| Record::new(key.clone(), payload.clone())))
    }

    async fn put_record(&self, record: &Record) -> Result<PutResult> {
        let mut inner = self.write()?;
        let previous = inner
            .records
            .insert(record.key.clone(), record.payload.clone());
        Ok(match previous {
            Some(_) => PutResult::Replaced,
            None => PutResult::Inserted,
        })
    }

    async fn has_record(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.read()?.records.contains_key(key))
    }

    async fn scan_records(&self) -> Result<Vec<Record>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .iter()
            .map(|(key, payload)| Record::new(key.clone(), payload.clone()))
            .collect())
    }

    async fn record_count(&self) -> Result<u64> {
        Ok(self.read()?.records.len() as u64)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_permissions(&self, key: &PermissionKey) -> Result<Option<PermissionSet>> {
        Ok(self.read()?.permissions.get(key).cloned())
    }

    async fn put_permissions(&self, set: &PermissionSet) -> Result<()> {
        self.write()?.permissions.insert(set.key(), set.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use medledger_core::{PermissionKind, SubjectType};
    use proptest::prelude::*;

    fn make_record(id: &str, body: &[u8]) -> Record {
        Record::new(
            ResourceKey::new("Observation", id, 1),
            EncryptedBlob::new(b"capsule".to_vec(), body.to_vec()),
        )
    }

    #[tokio::test]
    async fn test_memory_store_put_and_get() {
        let store = MemoryStore::new();
        let record = make_record("obs-1", b"body");

        let result = store.put_record(&record).await.unwrap();
        assert_eq!(result, PutResult::Inserted);

        let retrieved = store.get_record(&record.key).await.unwrap().unwrap();
        assert_eq!(retrieved, record);
        assert!(store.has_record(&record.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_replaces_in_place() {
        let store = MemoryStore::new();
        let original = make_record("obs-1", b"v1");
        let replacement = make_record("obs-1", b"v2");

        store.put_record(&original).await.unwrap();
        let result = store.put_record(&replacement).await.unwrap();
        assert_eq!(result, PutResult::Replaced);

        assert_eq!(store.record_count().await.unwrap(), 1);
        let retrieved = store.require_record(&original.key).await.unwrap();
        assert_eq!(retrieved.payload, replacement.payload);
    }

    #[tokio::test]
    async fn test_memory_store_scan() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .put_record(&make_record(&format!("obs-{i}"), &[i]))
                .await
                .unwrap();
        }
        assert_eq!(store.scan_records().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_memory_store_require_missing() {
        let store = MemoryStore::new();
        let key = ResourceKey::new("Patient", "nobody", 1);
        assert!(matches!(
            store.require_record(&key).await,
            Err(StoreError::NotFound(k)) if k == key
        ));
    }

    #[tokio::test]
    async fn test_memory_store_permissions_overwrite() {
        let store = MemoryStore::new();
        let key = PermissionKey::new(SubjectType::Doctor, 7, 3);

        assert!(store.get_permissions(&key).await.unwrap().is_none());

        store
            .put_permissions(&PermissionSet::new(key, PermissionKind::ALL))
            .await
            .unwrap();
        store
            .put_permissions(&PermissionSet::new(key, [PermissionKind::Read]))
            .await
            .unwrap();

        let set = store.get_permissions(&key).await.unwrap().unwrap();
        assert!(set.allows(PermissionKind::Read));
        assert!(!set.allows(PermissionKind::Write));
    }

    proptest! {
        #[test]
        fn prop_scan_returns_every_latest_payload(
            writes in prop::collection::vec((0u8..8, prop::collection::vec(any::<u8>(), 0..16)), 1..32)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (scanned, expected) = runtime.block_on(async {
                let store = MemoryStore::new();
                let mut expected = HashMap::new();
                for (id, body) in &writes {
                    let record = make_record(&id.to_string(), body);
                    store.put_record(&record).await.unwrap();
                    expected.insert(record.key, record.payload);
                }
                let scanned: HashMap<_, _> = store
                    .scan_records()
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|r| (r.key, r.payload))
                    .collect();
                (scanned, expected)
            });
            prop_assert_eq!(scanned, expected);
        }
    }
}

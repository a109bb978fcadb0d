//! Fault-injecting wrappers around the three collaborators.
//!
//! Each wrapper delegates to an inner implementation until a fault is armed.
//! Faults stay armed until cleared.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use medledger_core::{
    Digest, EncryptedBlob, MerkleProof, MerkleRoot, PermissionHash, PermissionKey,
    PermissionSet, Record, ResourceKey, SubjectType,
};
use medledger_ledger::{LedgerClient, LedgerError, SubjectProfile, TxReceipt};
use medledger_reencrypt::{ReEncryptError, ReEncryptionClient};
use medledger_store::{PermissionStore, PutResult, RecordStore, StoreError};

/// Long enough that any configured timeout fires first.
const HANG: Duration = Duration::from_secs(3600);

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

/// What the ledger does wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerFault {
    #[default]
    None,
    /// `set_root` never returns.
    SetRootHangs,
    /// `set_root` is rejected.
    SetRootReverts,
    /// `set_permission_hash` is rejected.
    PermissionHashReverts,
    /// `mint_subject` is rejected.
    MintReverts,
}

/// A ledger that fails on demand.
pub struct FaultyLedger<L> {
    inner: L,
    fault: RwLock<LedgerFault>,
}

impl<L: LedgerClient> FaultyLedger<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            fault: RwLock::new(LedgerFault::None),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub async fn arm(&self, fault: LedgerFault) {
        *self.fault.write().await = fault;
    }

    pub async fn clear(&self) {
        self.arm(LedgerFault::None).await;
    }

    async fn is_armed(&self, fault: LedgerFault) -> bool {
        *self.fault.read().await == fault
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for FaultyLedger<L> {
    async fn get_root(&self) -> medledger_ledger::Result<Option<MerkleRoot>> {
        self.inner.get_root().await
    }

    async fn set_root(&self, root: MerkleRoot) -> medledger_ledger::Result<TxReceipt> {
        if self.is_armed(LedgerFault::SetRootHangs).await {
            tokio::time::sleep(HANG).await;
        }
        if self.is_armed(LedgerFault::SetRootReverts).await {
            return Err(LedgerError::Reverted("setRoot: injected fault".into()));
        }
        self.inner.set_root(root).await
    }

    async fn verify_proof(
        &self,
        leaf_hash: &Digest,
        proof: &MerkleProof,
    ) -> medledger_ledger::Result<bool> {
        self.inner.verify_proof(leaf_hash, proof).await
    }

    async fn get_permission_hash(
        &self,
        key: &PermissionKey,
    ) -> medledger_ledger::Result<Option<PermissionHash>> {
        self.inner.get_permission_hash(key).await
    }

    async fn set_permission_hash(
        &self,
        key: &PermissionKey,
        hash: PermissionHash,
    ) -> medledger_ledger::Result<TxReceipt> {
        if self.is_armed(LedgerFault::PermissionHashReverts).await {
            return Err(LedgerError::Reverted(
                "setPermissionHash: injected fault".into(),
            ));
        }
        self.inner.set_permission_hash(key, hash).await
    }

    async fn mint_subject(
        &self,
        subject_type: SubjectType,
        profile: &SubjectProfile,
    ) -> medledger_ledger::Result<(u64, TxReceipt)> {
        if self.is_armed(LedgerFault::MintReverts).await {
            return Err(LedgerError::Reverted("mint: injected fault".into()));
        }
        self.inner.mint_subject(subject_type, profile).await
    }

    async fn get_subject(
        &self,
        subject_type: SubjectType,
        token_id: u64,
    ) -> medledger_ledger::Result<Option<SubjectProfile>> {
        self.inner.get_subject(subject_type, token_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Re-encryption Service
// ─────────────────────────────────────────────────────────────────────────────

/// Which re-encryption call is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReEncryptFault {
    #[default]
    None,
    Encrypt,
    Grant,
    Decrypt,
    GenerateKeys,
}

/// A re-encryption service that answers 503 on demand.
pub struct FaultyReEncryption<R> {
    inner: R,
    fault: RwLock<ReEncryptFault>,
}

impl<R: ReEncryptionClient> FaultyReEncryption<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            fault: RwLock::new(ReEncryptFault::None),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub async fn arm(&self, fault: ReEncryptFault) {
        *self.fault.write().await = fault;
    }

    pub async fn clear(&self) {
        self.arm(ReEncryptFault::None).await;
    }

    async fn check(&self, call: ReEncryptFault) -> medledger_reencrypt::Result<()> {
        if *self.fault.read().await == call {
            return Err(ReEncryptError::Service {
                status: 503,
                message: format!("{call:?}: injected fault"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<R: ReEncryptionClient> ReEncryptionClient for FaultyReEncryption<R> {
    async fn encrypt(
        &self,
        owner_id: &str,
        plaintext: &str,
    ) -> medledger_reencrypt::Result<EncryptedBlob> {
        self.check(ReEncryptFault::Encrypt).await?;
        self.inner.encrypt(owner_id, plaintext).await
    }

    async fn grant(&self, owner_id: &str, grantee_ids: &[String]) -> medledger_reencrypt::Result<()> {
        self.check(ReEncryptFault::Grant).await?;
        self.inner.grant(owner_id, grantee_ids).await
    }

    async fn decrypt(
        &self,
        owner_id: &str,
        grantee_id: &str,
        blob: &EncryptedBlob,
    ) -> medledger_reencrypt::Result<String> {
        self.check(ReEncryptFault::Decrypt).await?;
        self.inner.decrypt(owner_id, grantee_id, blob).await
    }

    async fn generate_keys(&self, user_id: &str) -> medledger_reencrypt::Result<String> {
        self.check(ReEncryptFault::GenerateKeys).await?;
        self.inner.generate_keys(user_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// What the store does wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFault {
    #[default]
    None,
    /// `put_record` fails without writing.
    PutRecordFails,
    /// `put_record` writes, then never acknowledges.
    PutRecordSlowAck,
    /// `put_record` never returns and never writes.
    PutRecordHangs,
    /// `put_permissions` fails without writing.
    PutPermissionsFails,
}

/// A store that fails writes on demand.
pub struct FaultyStore<S> {
    inner: S,
    fault: RwLock<StoreFault>,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fault: RwLock::new(StoreFault::None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub async fn arm(&self, fault: StoreFault) {
        *self.fault.write().await = fault;
    }

    pub async fn clear(&self) {
        self.arm(StoreFault::None).await;
    }

    async fn check(&self, call: StoreFault) -> medledger_store::Result<()> {
        if *self.fault.read().await == call {
            return Err(StoreError::InvalidData(format!("{call:?}: injected fault")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for FaultyStore<S> {
    async fn get_record(&self, key: &ResourceKey) -> medledger_store::Result<Option<Record>> {
        self.inner.get_record(key).await
    }

    async fn put_record(&self, record: &Record) -> medledger_store::Result<PutResult> {
        self.check(StoreFault::PutRecordFails).await?;
        let fault = *self.fault.read().await;
        if fault == StoreFault::PutRecordHangs {
            tokio::time::sleep(HANG).await;
        }
        let put = self.inner.put_record(record).await?;
        if fault == StoreFault::PutRecordSlowAck {
            tokio::time::sleep(HANG).await;
        }
        Ok(put)
    }

    async fn has_record(&self, key: &ResourceKey) -> medledger_store::Result<bool> {
        self.inner.has_record(key).await
    }

    async fn scan_records(&self) -> medledger_store::Result<Vec<Record>> {
        self.inner.scan_records().await
    }

    async fn record_count(&self) -> medledger_store::Result<u64> {
        self.inner.record_count().await
    }
}

#[async_trait]
impl<S: PermissionStore> PermissionStore for FaultyStore<S> {
    async fn get_permissions(
        &self,
        key: &PermissionKey,
    ) -> medledger_store::Result<Option<PermissionSet>> {
        self.inner.get_permissions(key).await
    }

    async fn put_permissions(&self, set: &PermissionSet) -> medledger_store::Result<()> {
        self.check(StoreFault::PutPermissionsFails).await?;
        self.inner.put_permissions(set).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_ledger::MemoryLedger;
    use medledger_reencrypt::LocalReEncryption;
    use medledger_store::MemoryStore;

    #[tokio::test]
    async fn test_ledger_fault_arm_and_clear() {
        let ledger = FaultyLedger::new(MemoryLedger::new());
        let root = MerkleRoot(Digest::hash(b"r"));

        ledger.arm(LedgerFault::SetRootReverts).await;
        assert!(matches!(
            ledger.set_root(root).await,
            Err(LedgerError::Reverted(_))
        ));
        assert_eq!(ledger.get_root().await.unwrap(), None);

        ledger.clear().await;
        ledger.set_root(root).await.unwrap();
        assert_eq!(ledger.get_root().await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn test_hanging_set_root_is_cut_by_timeout() {
        let ledger = FaultyLedger::new(MemoryLedger::new());
        ledger.arm(LedgerFault::SetRootHangs).await;

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            ledger.set_root(MerkleRoot(Digest::ZERO)),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reencrypt_fault_only_hits_armed_call() {
        let service = FaultyReEncryption::new(LocalReEncryption::new());
        service.generate_keys("patient-1").await.unwrap();
        service.arm(ReEncryptFault::Grant).await;

        let blob = service.encrypt("patient-1", "x").await.unwrap();
        assert!(matches!(
            service.grant("patient-1", &[]).await,
            Err(ReEncryptError::Service { status: 503, .. })
        ));
        assert_eq!(service.decrypt("patient-1", "patient-1", &blob).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_slow_ack_writes_before_timing_out() {
        let store = FaultyStore::new(MemoryStore::new());
        store.arm(StoreFault::PutRecordSlowAck).await;

        let record = Record::new(
            ResourceKey::new("Patient", "p", 1),
            EncryptedBlob::new(vec![1], vec![2]),
        );
        let result =
            tokio::time::timeout(Duration::from_millis(20), store.put_record(&record)).await;
        assert!(result.is_err());
        assert_eq!(store.get_record(&record.key).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_store_fault_blocks_write() {
        let store = FaultyStore::new(MemoryStore::new());
        store.arm(StoreFault::PutRecordFails).await;

        let record = Record::new(
            ResourceKey::new("Patient", "p", 1),
            EncryptedBlob::new(vec![1], vec![2]),
        );
        assert!(store.put_record(&record).await.is_err());
        assert_eq!(store.record_count().await.unwrap(), 0);
    }
}

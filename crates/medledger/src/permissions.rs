//! Permission commitment engine.
//!
//! A permission set is trusted only while the hash of its canonical grants
//! matches the hash stored on the ledger for the same key.

use std::sync::Arc;
use std::time::Duration;

use medledger_core::{commit_hash, PermissionKey, PermissionKind, PermissionSet};
use medledger_ledger::{LedgerClient, TxReceipt};
use medledger_store::PermissionStore;

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::timeout::bounded;

/// Commits permission sets to the ledger and verifies them against it.
pub struct PermissionCommitmentEngine<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    call_timeout: Duration,
    ledger_timeout: Duration,
}

impl<S: PermissionStore, L: LedgerClient> PermissionCommitmentEngine<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>, config: &KernelConfig) -> Self {
        Self {
            store,
            ledger,
            call_timeout: config.call_timeout,
            ledger_timeout: config.ledger_timeout,
        }
    }

    /// Commit the set's hash on the ledger, then store the set.
    ///
    /// The ledger goes first: a crash in between leaves a committed hash with
    /// a stale or missing off-chain set, which verifies as a mismatch and
    /// never as a silent grant.
    pub async fn assign(&self, set: &PermissionSet) -> Result<TxReceipt> {
        let key = set.key();
        let hash = commit_hash(&set.grants);
        let receipt = bounded(
            self.ledger_timeout,
            "set_permission_hash",
            self.ledger.set_permission_hash(&key, hash),
        )
        .await?;
        bounded(self.call_timeout, "put_permissions", self.store.put_permissions(set)).await?;

        tracing::info!(
            permission_key = %key,
            hash = %hash,
            block = receipt.block_number,
            "permission set committed"
        );
        Ok(receipt)
    }

    /// Check that `key` holds `required`, against the committed hash.
    ///
    /// Returns `Ok(false)` only when the set is authentic and lacks the grant.
    pub async fn verify(&self, key: &PermissionKey, required: PermissionKind) -> Result<bool> {
        let set = bounded(self.call_timeout, "get_permissions", self.store.get_permissions(key))
            .await?
            .ok_or(KernelError::PermissionSetNotFound(*key))?;

        let stored = bounded(
            self.ledger_timeout,
            "get_permission_hash",
            self.ledger.get_permission_hash(key),
        )
        .await?;

        let computed = commit_hash(&set.grants);
        match stored {
            None => Err(KernelError::IntegrityMismatch(format!(
                "no permission hash on ledger for {key}"
            ))),
            Some(stored) if stored != computed => {
                tracing::warn!(
                    permission_key = %key,
                    ledger = %stored,
                    computed = %computed,
                    "permission set does not match ledger"
                );
                Err(KernelError::IntegrityMismatch(format!(
                    "permission set for {key} does not match its ledger hash"
                )))
            }
            Some(_) => Ok(set.allows(required)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_core::SubjectType;
    use medledger_ledger::MemoryLedger;
    use medledger_store::MemoryStore;

    use crate::error::ErrorKind;

    const DOCTOR: PermissionKey = PermissionKey::new(SubjectType::Doctor, 7, 3);

    fn engine() -> (
        Arc<MemoryStore>,
        Arc<MemoryLedger>,
        PermissionCommitmentEngine<MemoryStore, MemoryLedger>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let engine =
            PermissionCommitmentEngine::new(store.clone(), ledger.clone(), &KernelConfig::default());
        (store, ledger, engine)
    }

    #[tokio::test]
    async fn test_assign_then_verify() {
        let (_, ledger, engine) = engine();
        let set = PermissionSet::new(DOCTOR, [PermissionKind::Read]);
        engine.assign(&set).await.unwrap();

        assert_eq!(
            ledger.get_permission_hash(&DOCTOR).await.unwrap(),
            Some(commit_hash(&set.grants))
        );
        assert!(engine.verify(&DOCTOR, PermissionKind::Read).await.unwrap());
        assert!(!engine.verify(&DOCTOR, PermissionKind::Write).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_set_is_authorization_error() {
        let (_, _, engine) = engine();
        let err = engine.verify(&DOCTOR, PermissionKind::Read).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_tampered_set_detected() {
        let (store, _, engine) = engine();
        engine
            .assign(&PermissionSet::new(DOCTOR, [PermissionKind::Read]))
            .await
            .unwrap();

        // Widen the grants off-chain only.
        store
            .put_permissions(&PermissionSet::new(DOCTOR, PermissionKind::ALL))
            .await
            .unwrap();

        let err = engine.verify(&DOCTOR, PermissionKind::Write).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    }

    #[tokio::test]
    async fn test_uncommitted_set_detected() {
        let (store, _, engine) = engine();
        store
            .put_permissions(&PermissionSet::new(DOCTOR, [PermissionKind::Read]))
            .await
            .unwrap();

        let err = engine.verify(&DOCTOR, PermissionKind::Read).await.unwrap_err();
        assert!(matches!(err, KernelError::IntegrityMismatch(_)));
    }

    #[tokio::test]
    async fn test_ledger_rejection_leaves_store_untouched() {
        let (store, _, engine) = engine();
        let key = PermissionKey::new(SubjectType::Doctor, 0, 3);
        let err = engine
            .assign(&PermissionSet::new(key, [PermissionKind::Read]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(store.get_permissions(&key).await.unwrap().is_none());
    }
}

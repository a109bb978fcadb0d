//! Ledger client abstraction.
//!
//! Implementations talk to whatever hosts the commitment contract. The
//! in-memory ledger in [`memory`] is used by tests and offline tooling.

use async_trait::async_trait;
use medledger_core::{
    Digest, MerkleProof, MerkleRoot, PermissionHash, PermissionKey, SubjectType,
};

use crate::error::Result;
use crate::receipt::{SubjectProfile, TxReceipt};

/// Typed interface to the ledger's commitments.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerClient: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Merkle Root Slot
    // ─────────────────────────────────────────────────────────────────────────

    /// The currently committed root, if one was ever set.
    async fn get_root(&self) -> Result<Option<MerkleRoot>>;

    /// Submit a new root and wait for the transaction receipt.
    async fn set_root(&self, root: MerkleRoot) -> Result<TxReceipt>;

    /// Verify an inclusion proof against the stored root, ledger-side.
    ///
    /// Returns false when no root is set.
    async fn verify_proof(&self, leaf_hash: &Digest, proof: &MerkleProof) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permission Slots
    // ─────────────────────────────────────────────────────────────────────────

    /// The stored permission hash for a key, if any.
    async fn get_permission_hash(&self, key: &PermissionKey) -> Result<Option<PermissionHash>>;

    /// Store the permission hash for a key.
    async fn set_permission_hash(
        &self,
        key: &PermissionKey,
        hash: PermissionHash,
    ) -> Result<TxReceipt>;

    // ─────────────────────────────────────────────────────────────────────────
    // Subject Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Mint an identity token. Token ids are allocated per subject type,
    /// starting at 1.
    async fn mint_subject(
        &self,
        subject_type: SubjectType,
        profile: &SubjectProfile,
    ) -> Result<(u64, TxReceipt)>;

    /// Look up a minted subject.
    async fn get_subject(
        &self,
        subject_type: SubjectType,
        token_id: u64,
    ) -> Result<Option<SubjectProfile>>;
}

/// Fold a proof's siblings over a leaf with sorted-pair hashing.
///
/// This is how a contract verifies: it never sees the side of each step and
/// sorts every pair instead.
pub fn verify_sorted_path(leaf_hash: &Digest, proof: &MerkleProof, root: &MerkleRoot) -> bool {
    let computed = proof
        .siblings()
        .fold(*leaf_hash, |current, sibling| Digest::hash_pair(&current, sibling));
    computed == root.0
}

/// A ledger held in process memory.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use tokio::sync::RwLock;

    use crate::error::LedgerError;

    #[derive(Default)]
    struct LedgerState {
        root: Option<MerkleRoot>,
        permission_hashes: HashMap<PermissionKey, PermissionHash>,
        subjects: HashMap<(SubjectType, u64), SubjectProfile>,
        last_token: HashMap<SubjectType, u64>,
        block_number: u64,
        root_history: Vec<MerkleRoot>,
    }

    impl LedgerState {
        /// Mine the next block and derive a transaction hash for it.
        fn mine(&mut self, method: &str, payload: &[u8]) -> TxReceipt {
            self.block_number += 1;
            let mut preimage = Vec::with_capacity(8 + method.len() + payload.len());
            preimage.extend_from_slice(&self.block_number.to_be_bytes());
            preimage.extend_from_slice(method.as_bytes());
            preimage.extend_from_slice(payload);
            TxReceipt {
                tx_hash: Digest::hash(&preimage),
                block_number: self.block_number,
            }
        }
    }

    /// In-memory ledger.
    ///
    /// Every write mines exactly one block.
    #[derive(Default)]
    pub struct MemoryLedger {
        state: RwLock<LedgerState>,
        latency: Option<Duration>,
    }

    impl MemoryLedger {
        /// Create an empty ledger.
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every write by `latency`, to widen race windows in tests.
        pub fn with_latency(latency: Duration) -> Self {
            Self {
                state: RwLock::default(),
                latency: Some(latency),
            }
        }

        /// Every root ever committed, oldest first.
        pub async fn root_history(&self) -> Vec<MerkleRoot> {
            self.state.read().await.root_history.clone()
        }

        /// Height of the latest block.
        pub async fn block_number(&self) -> u64 {
            self.state.read().await.block_number
        }

        async fn simulate_latency(&self) {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
        }
    }

    #[async_trait]
    impl LedgerClient for MemoryLedger {
        async fn get_root(&self) -> Result<Option<MerkleRoot>> {
            Ok(self.state.read().await.root)
        }

        async fn set_root(&self, root: MerkleRoot) -> Result<TxReceipt> {
            self.simulate_latency().await;
            let mut state = self.state.write().await;
            state.root = Some(root);
            state.root_history.push(root);
            let receipt = state.mine("setRoot", root.as_bytes());
            tracing::debug!(root = %root, block = receipt.block_number, "root committed");
            Ok(receipt)
        }

        async fn verify_proof(&self, leaf_hash: &Digest, proof: &MerkleProof) -> Result<bool> {
            let state = self.state.read().await;
            Ok(state
                .root
                .map_or(false, |root| verify_sorted_path(leaf_hash, proof, &root)))
        }

        async fn get_permission_hash(
            &self,
            key: &PermissionKey,
        ) -> Result<Option<PermissionHash>> {
            Ok(self.state.read().await.permission_hashes.get(key).copied())
        }

        async fn set_permission_hash(
            &self,
            key: &PermissionKey,
            hash: PermissionHash,
        ) -> Result<TxReceipt> {
            if key.token_id == 0 {
                return Err(LedgerError::InvalidArgument(
                    "token ids start at 1".into(),
                ));
            }
            self.simulate_latency().await;
            let mut state = self.state.write().await;
            state.permission_hashes.insert(*key, hash);
            Ok(state.mine("setPermissionHash", hash.as_bytes()))
        }

        async fn mint_subject(
            &self,
            subject_type: SubjectType,
            profile: &SubjectProfile,
        ) -> Result<(u64, TxReceipt)> {
            if profile.address.is_empty() {
                return Err(LedgerError::InvalidArgument(
                    "subject address is required".into(),
                ));
            }
            self.simulate_latency().await;
            let mut state = self.state.write().await;
            let token_id = {
                let last = state.last_token.entry(subject_type).or_insert(0);
                *last += 1;
                *last
            };
            state
                .subjects
                .insert((subject_type, token_id), profile.clone());

            let mut payload = vec![subject_type.ledger_code()];
            payload.extend_from_slice(&token_id.to_be_bytes());
            let receipt = state.mine("mintSubject", &payload);
            Ok((token_id, receipt))
        }

        async fn get_subject(
            &self,
            subject_type: SubjectType,
            token_id: u64,
        ) -> Result<Option<SubjectProfile>> {
            Ok(self
                .state
                .read()
                .await
                .subjects
                .get(&(subject_type, token_id))
                .cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryLedger;
    use super::*;
    use medledger_core::{commit_hash, MerkleTree, PermissionKind};
    use proptest::prelude::*;

    fn profile(address: &str) -> SubjectProfile {
        SubjectProfile::new(address, "Ada", "Rossi", "RSSDAA80A01H501U")
    }

    #[tokio::test]
    async fn test_root_slot() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.get_root().await.unwrap(), None);

        let root = MerkleRoot(Digest::hash(b"r1"));
        let receipt = ledger.set_root(root).await.unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(ledger.get_root().await.unwrap(), Some(root));

        let next = MerkleRoot(Digest::hash(b"r2"));
        ledger.set_root(next).await.unwrap();
        assert_eq!(ledger.root_history().await, vec![root, next]);
    }

    #[tokio::test]
    async fn test_ledger_side_proof_verification() {
        let blobs: Vec<&[u8]> = vec![b"a", b"b", b"c", b"d", b"e"];
        let tree = MerkleTree::build(&blobs).unwrap();
        let ledger = MemoryLedger::new();

        let proof = tree.proof(b"c").unwrap();
        let leaf = Digest::hash(b"c");
        assert!(!ledger.verify_proof(&leaf, &proof).await.unwrap());

        ledger.set_root(tree.root()).await.unwrap();
        assert!(ledger.verify_proof(&leaf, &proof).await.unwrap());
        assert!(!ledger
            .verify_proof(&Digest::hash(b"zz"), &proof)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_permission_slots() {
        let ledger = MemoryLedger::new();
        let key = PermissionKey::new(SubjectType::Doctor, 7, 3);
        assert_eq!(ledger.get_permission_hash(&key).await.unwrap(), None);

        let hash = commit_hash(&[PermissionKind::Read]);
        ledger.set_permission_hash(&key, hash).await.unwrap();
        assert_eq!(ledger.get_permission_hash(&key).await.unwrap(), Some(hash));

        let zero = PermissionKey::new(SubjectType::Doctor, 0, 3);
        assert!(ledger.set_permission_hash(&zero, hash).await.is_err());
    }

    #[tokio::test]
    async fn test_token_ids_are_per_subject_type() {
        let ledger = MemoryLedger::new();

        let (d1, _) = ledger
            .mint_subject(SubjectType::Doctor, &profile("0xd1"))
            .await
            .unwrap();
        let (d2, _) = ledger
            .mint_subject(SubjectType::Doctor, &profile("0xd2"))
            .await
            .unwrap();
        let (p1, _) = ledger
            .mint_subject(SubjectType::Patient, &profile("0xp1"))
            .await
            .unwrap();

        assert_eq!((d1, d2, p1), (1, 2, 1));
        let stored = ledger
            .get_subject(SubjectType::Doctor, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.address, "0xd2");
        assert!(ledger
            .get_subject(SubjectType::Assistant, 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_distinct_tx_hashes() {
        let ledger = MemoryLedger::new();
        let root = MerkleRoot(Digest::hash(b"same"));
        let a = ledger.set_root(root).await.unwrap();
        let b = ledger.set_root(root).await.unwrap();
        assert_ne!(a.tx_hash, b.tx_hash);
        assert_eq!(ledger.block_number().await, 2);
    }

    proptest! {
        #[test]
        fn prop_ledger_verifier_agrees_with_local_proofs(
            blobs in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 1..24)
        ) {
            let tree = MerkleTree::build(&blobs).unwrap();
            let root = tree.root();
            for blob in &blobs {
                let leaf = Digest::hash(blob);
                let proof = tree.proof_for_hash(&leaf).unwrap();
                prop_assert!(verify_sorted_path(&leaf, &proof, &root));
            }
        }
    }
}

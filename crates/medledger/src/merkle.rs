//! Merkle commitment engine.
//!
//! Rebuilds the tree from a full scan of the record store on every call, so
//! any party holding the store can recompute the committed root
//! independently.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use medledger_core::{
    verify_leaf_hash, Digest, MerkleProof, MerkleRoot, MerkleTree, ResourceKey,
};
use medledger_ledger::{LedgerClient, TxReceipt};
use medledger_store::RecordStore;

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::timeout::bounded;

/// A published root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub root: MerkleRoot,
    /// Number of records the root covers.
    pub leaf_count: usize,
    pub receipt: TxReceipt,
}

/// Result of checking one record against the committed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub key: ResourceKey,
    pub leaf_hash: Digest,
    pub proof: MerkleProof,
    /// Root recomputed from the store right now.
    pub computed_root: MerkleRoot,
    /// Root currently on the ledger, if any was ever published.
    pub ledger_root: Option<MerkleRoot>,
    /// The proof verifies locally against the ledger root.
    pub locally_valid: bool,
    /// The ledger's own verdict on the proof; `None` when not asked.
    pub ledger_valid: Option<bool>,
}

impl IntegrityReport {
    /// Both verifiers accept the record.
    pub fn is_consistent(&self) -> bool {
        self.locally_valid && self.ledger_valid.unwrap_or(true)
    }

    /// Human-readable reason for an inconsistent report.
    pub fn describe_failure(&self) -> String {
        match (self.ledger_root, self.ledger_valid) {
            (None, _) => format!("no root on ledger; store root is {}", self.computed_root),
            (Some(ledger_root), _) if !self.locally_valid => format!(
                "{} does not verify: store root {} != ledger root {}",
                self.key, self.computed_root, ledger_root
            ),
            (Some(_), Some(false)) => {
                format!("{} verifies locally but the ledger rejects its proof", self.key)
            }
            _ => format!("{} is consistent", self.key),
        }
    }
}

/// Builds trees over the record store and commits their roots.
pub struct MerkleCommitmentEngine<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    call_timeout: Duration,
    ledger_timeout: Duration,
    verify_on_ledger: bool,
}

impl<S: RecordStore, L: LedgerClient> MerkleCommitmentEngine<S, L> {
    /// Create an engine over the given collaborators.
    pub fn new(store: Arc<S>, ledger: Arc<L>, config: &KernelConfig) -> Self {
        Self {
            store,
            ledger,
            call_timeout: config.call_timeout,
            ledger_timeout: config.ledger_timeout,
            verify_on_ledger: config.verify_on_ledger,
        }
    }

    /// Scan the store and build a tree over every record payload.
    ///
    /// Fails with `EmptyInput` when the store is empty.
    pub async fn snapshot(&self) -> Result<MerkleTree> {
        let records = bounded(self.call_timeout, "scan_records", self.store.scan_records()).await?;
        let leaves = records.iter().map(|r| r.payload.leaf_hash()).collect();
        Ok(MerkleTree::from_leaf_hashes(leaves)?)
    }

    /// Publish a tree's root on the ledger.
    pub async fn publish(&self, tree: &MerkleTree) -> Result<CommitOutcome> {
        let root = tree.root();
        let receipt = bounded(self.ledger_timeout, "set_root", self.ledger.set_root(root)).await?;
        tracing::info!(
            root = %root,
            leaves = tree.leaf_count(),
            block = receipt.block_number,
            "merkle root committed"
        );
        Ok(CommitOutcome {
            root,
            leaf_count: tree.leaf_count(),
            receipt,
        })
    }

    /// The root currently on the ledger.
    pub async fn ledger_root(&self) -> Result<Option<MerkleRoot>> {
        bounded(self.ledger_timeout, "get_root", self.ledger.get_root()).await
    }

    /// Check a stored record against the ledger root.
    ///
    /// Reports mismatches instead of failing on them.
    pub async fn check_record(&self, key: &ResourceKey) -> Result<IntegrityReport> {
        let record = bounded(self.call_timeout, "get_record", self.store.get_record(key))
            .await?
            .ok_or_else(|| KernelError::RecordNotFound(key.clone()))?;
        let leaf_hash = record.payload.leaf_hash();

        let tree = self.snapshot().await?;
        let proof = tree.proof_for_hash(&leaf_hash)?;
        let computed_root = tree.root();

        let ledger_root = self.ledger_root().await?;
        let locally_valid = ledger_root.map_or(false, |root| verify_leaf_hash(&leaf_hash, &proof, &root));

        let ledger_valid = if self.verify_on_ledger {
            Some(
                bounded(
                    self.ledger_timeout,
                    "verify_proof",
                    self.ledger.verify_proof(&leaf_hash, &proof),
                )
                .await?,
            )
        } else {
            None
        };

        Ok(IntegrityReport {
            key: key.clone(),
            leaf_hash,
            proof,
            computed_root,
            ledger_root,
            locally_valid,
            ledger_valid,
        })
    }
}

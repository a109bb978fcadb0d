//! Merkle tree over the stored record payloads.
//!
//! Construction rules:
//! 1. Leaf = `H(blob)`.
//! 2. Leaves are sorted before the first level is built, so the root depends
//!    only on the multiset of blobs, never on the order the store returned them.
//! 3. Parent = `H(min(l, r) || max(l, r))`.
//! 4. An odd node at the end of a level is promoted unchanged.
//!
//! A proof is the list of siblings from leaf to root. Each step records on
//! which side of the concatenation the sibling sits; with sorted pairs that
//! is simply whether the sibling sorts below the running hash.
//!
//! Duplicate blobs produce equal, adjacent leaves. [`MerkleTree::proof`]
//! always proves the first of them.

use serde::{Deserialize, Serialize};

use crate::crypto::{Digest, MerkleRoot};
use crate::error::{CoreError, Result};

/// Position of a sibling in the concatenation at one proof step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is hashed first: `H(sibling || current)`.
    Left,
    /// Sibling is hashed second: `H(current || sibling)`.
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub side: Side,
}

/// An inclusion proof, ordered leaf to root.
///
/// Valid only against the root of the tree it was generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// A proof for a single-leaf tree has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fold the steps over a leaf hash.
    pub fn compute_root(&self, leaf_hash: &Digest) -> Digest {
        self.steps.iter().fold(*leaf_hash, |current, step| match step.side {
            Side::Left => hash_ordered(&step.sibling, &current),
            Side::Right => hash_ordered(&current, &step.sibling),
        })
    }

    /// Sibling hashes only, for ledger-side verifiers that sort pairs themselves.
    pub fn siblings(&self) -> impl Iterator<Item = &Digest> {
        self.steps.iter().map(|s| &s.sibling)
    }
}

/// A fully materialized Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the sorted leaves; the last level holds the root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree over the given blobs.
    ///
    /// Fails with [`CoreError::EmptyInput`] if `blobs` is empty.
    pub fn build<B: AsRef<[u8]>>(blobs: &[B]) -> Result<Self> {
        let leaves = blobs.iter().map(|b| Digest::hash(b.as_ref())).collect();
        Self::from_leaf_hashes(leaves)
    }

    /// Build a tree from precomputed leaf hashes.
    pub fn from_leaf_hashes(mut leaves: Vec<Digest>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(CoreError::EmptyInput);
        }
        leaves.sort();

        let mut levels = vec![leaves];
        while levels.last().map_or(0, Vec::len) > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => Digest::hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The root of the tree.
    pub fn root(&self) -> MerkleRoot {
        // Construction guarantees a non-empty top level.
        MerkleRoot(self.levels[self.levels.len() - 1][0])
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// The sorted leaf hashes.
    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    /// Produce an inclusion proof for a blob.
    pub fn proof(&self, leaf_blob: &[u8]) -> Result<MerkleProof> {
        self.proof_for_hash(&Digest::hash(leaf_blob))
    }

    /// Produce an inclusion proof for a leaf hash.
    pub fn proof_for_hash(&self, leaf_hash: &Digest) -> Result<MerkleProof> {
        let mut index = self
            .first_index_of(leaf_hash)
            .ok_or(CoreError::LeafNotFound(*leaf_hash))?;

        let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
        for level in &self.levels[..self.levels.len() - 1] {
            let current = level[index];
            let sibling_index = index ^ 1;

            // No sibling means the node was promoted; nothing to record.
            if let Some(sibling) = level.get(sibling_index) {
                let side = if *sibling < current {
                    Side::Left
                } else {
                    Side::Right
                };
                steps.push(ProofStep {
                    sibling: *sibling,
                    side,
                });
            }
            index /= 2;
        }

        Ok(MerkleProof { steps })
    }

    fn first_index_of(&self, leaf_hash: &Digest) -> Option<usize> {
        let leaves = &self.levels[0];
        let index = leaves.partition_point(|h| h < leaf_hash);
        (leaves.get(index) == Some(leaf_hash)).then_some(index)
    }
}

/// Verify that `leaf_blob` is included under `expected_root`.
pub fn verify(leaf_blob: &[u8], proof: &MerkleProof, expected_root: &MerkleRoot) -> bool {
    verify_leaf_hash(&Digest::hash(leaf_blob), proof, expected_root)
}

/// Verify a leaf hash against a root.
pub fn verify_leaf_hash(leaf_hash: &Digest, proof: &MerkleProof, expected_root: &MerkleRoot) -> bool {
    proof.compute_root(leaf_hash) == expected_root.0
}

fn hash_ordered(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&left.0);
    hasher.update(&right.0);
    Digest(*hasher.finalize().as_bytes())
}

//! # medledger Core
//!
//! Pure primitives for the integrity and access-commitment layer: record and
//! permission types, canonical encodings, Merkle trees, and the permission
//! commitment hash.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the values that get anchored on the ledger.
//!
//! ## Key Types
//!
//! - [`Digest`] - A 32-byte BLAKE3 digest
//! - [`MerkleRoot`] - The committed root over every stored record payload
//! - [`PermissionHash`] - The committed hash of one permission set
//! - [`Record`] / [`EncryptedBlob`] - Off-chain record versions, opaque to this layer
//! - [`MerkleTree`] / [`MerkleProof`] - Tree construction and inclusion proofs
//!
//! ## Canonicalization
//!
//! Everything that is hashed goes through deterministic CBOR first. See the
//! [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod permission;
pub mod types;

pub use canonical::{blob_leaf_bytes, decode_grants, grants_bytes};
pub use crypto::{Digest, MerkleRoot, PermissionHash};
pub use error::{CoreError, Result};
pub use merkle::{verify, verify_leaf_hash, MerkleProof, MerkleTree, ProofStep, Side};
pub use permission::commit_hash;
pub use types::{
    EncryptedBlob, PermissionKey, PermissionKind, PermissionSet, Record, ResourceKey, SubjectType,
};

//! Digest types for medledger.
//!
//! Every hash in the system is a 32-byte BLAKE3 output. The newtypes keep a
//! Merkle root from being handed to a slot expecting a permission hash.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Compute the BLAKE3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash two child digests into their parent.
    ///
    /// The pair is sorted before concatenation, so `hash_pair(a, b) == hash_pair(b, a)`.
    pub fn hash_pair(a: &Digest, b: &Digest) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = blake3::Hasher::new();
        hasher.update(&lo.0);
        hasher.update(&hi.0);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        parse_hex32(s).map(Self)
    }

    /// The zero digest (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// The Merkle root committed on the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot(pub Digest);

impl MerkleRoot {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Parse from hex string. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        Digest::from_hex(s).map(Self)
    }
}

impl fmt::Debug for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleRoot({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<Digest> for MerkleRoot {
    fn from(digest: Digest) -> Self {
        Self(digest)
    }
}

/// The hash of one canonical permission set, as stored on the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionHash(pub Digest);

impl PermissionHash {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Parse from hex string. A leading `0x` is accepted.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        Digest::from_hex(s).map(Self)
    }
}

impl fmt::Debug for PermissionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PermissionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<Digest> for PermissionHash {
    fn from(digest: Digest) -> Self {
        Self(digest)
    }
}

fn parse_hex32(s: &str) -> Result<[u8; 32], CoreError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
    bytes.as_slice().try_into().map_err(|_| {
        CoreError::InvalidDigest(format!("expected 32 bytes, got {}", bytes.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = Digest::hash(b"test data");
        let h2 = Digest::hash(b"test data");
        assert_eq!(h1, h2);
        assert_ne!(h1, Digest::hash(b"different data"));
    }

    #[test]
    fn test_hash_pair_is_symmetric() {
        let a = Digest::hash(b"a");
        let b = Digest::hash(b"b");
        assert_eq!(Digest::hash_pair(&a, &b), Digest::hash_pair(&b, &a));
    }

    #[test]
    fn test_hash_pair_concatenates_sorted() {
        let a = Digest::from_bytes([0x01; 32]);
        let b = Digest::from_bytes([0x02; 32]);

        let mut concat = Vec::new();
        concat.extend_from_slice(&a.0);
        concat.extend_from_slice(&b.0);

        assert_eq!(Digest::hash_pair(&b, &a), Digest::hash(&concat));
    }

    #[test]
    fn test_hex_roundtrip_with_prefix() {
        let digest = Digest::from_bytes([0xab; 32]);
        let prefixed = format!("0x{}", digest.to_hex());
        assert_eq!(Digest::from_hex(&prefixed).unwrap(), digest);
        assert_eq!(Digest::from_hex(&digest.to_hex()).unwrap(), digest);
    }

    #[test]
    fn test_hex_wrong_length_rejected() {
        assert!(matches!(
            Digest::from_hex("abcd"),
            Err(CoreError::InvalidDigest(_))
        ));
    }

    #[test]
    fn test_display_forms() {
        let root = MerkleRoot(Digest::from_bytes([0xcd; 32]));
        assert_eq!(format!("{}", root).len(), 64);
        assert!(format!("{:?}", root).starts_with("MerkleRoot("));
        assert_eq!(format!("{}", Digest::from_bytes([0xab; 32])), "abababababababab");
    }
}

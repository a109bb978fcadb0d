//! Canonical CBOR encoding for everything that gets hashed.
//!
//! This module implements the subset of RFC 8949 Core Deterministic Encoding
//! needed here:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//!
//! Two values are hashed: the Merkle leaf serialization of an
//! [`EncryptedBlob`], and a permission grant set. Both must produce identical
//! bytes on every platform, or the ledger commitments stop matching.

use std::collections::BTreeSet;

use ciborium::value::Value;

use crate::error::CoreError;
use crate::types::{EncryptedBlob, PermissionKind};

/// Blob field keys (integer keys for compact encoding).
mod keys {
    pub const CAPSULE: u64 = 0;
    pub const CIPHERTEXT: u64 = 1;
}

/// Encode a blob as the bytes of its Merkle leaf.
///
/// Format: `{0: capsule, 1: ciphertext}` as a canonical CBOR map. The keys
/// are single-byte integers, so ascending key order is encoded byte order.
pub fn blob_leaf_bytes(blob: &EncryptedBlob) -> Vec<u8> {
    let mut buf = Vec::with_capacity(blob.capsule.len() + blob.ciphertext.len() + 16);
    encode_uint(&mut buf, 5, 2);
    encode_uint(&mut buf, 0, keys::CAPSULE);
    encode_bytes(&mut buf, &blob.capsule);
    encode_uint(&mut buf, 0, keys::CIPHERTEXT);
    encode_bytes(&mut buf, &blob.ciphertext);
    buf
}

/// Encode a grant set canonically.
///
/// Duplicates collapse and the kinds are sorted by their total order, so any
/// two sets with the same members encode identically. Format: a CBOR array of
/// wire names.
pub fn grants_bytes<'a>(grants: impl IntoIterator<Item = &'a PermissionKind>) -> Vec<u8> {
    let sorted: BTreeSet<PermissionKind> = grants.into_iter().copied().collect();
    let mut buf = Vec::new();
    encode_uint(&mut buf, 4, sorted.len() as u64);
    for kind in &sorted {
        encode_text(&mut buf, kind.as_str());
    }
    buf
}

/// Decode a grant set produced by [`grants_bytes`].
pub fn decode_grants(bytes: &[u8]) -> Result<BTreeSet<PermissionKind>, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        _ => return Err(CoreError::DecodingError("expected array of grants".into())),
    };

    let mut grants = BTreeSet::new();
    for item in items {
        match item {
            Value::Text(name) => {
                grants.insert(name.parse::<PermissionKind>()?);
            }
            _ => return Err(CoreError::DecodingError("grant must be text".into())),
        }
    }
    Ok(grants)
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_leaf_bytes_layout() {
        let blob = EncryptedBlob::new(vec![0xaa, 0xbb], vec![0xcc]);
        let bytes = blob_leaf_bytes(&blob);

        // map(2), key 0, bytes(2) aa bb, key 1, bytes(1) cc
        assert_eq!(bytes, vec![0xa2, 0x00, 0x42, 0xaa, 0xbb, 0x01, 0x41, 0xcc]);
    }

    #[test]
    fn test_blob_leaf_bytes_distinguishes_field_boundaries() {
        // Same concatenation, different split between capsule and ciphertext.
        let a = EncryptedBlob::new(vec![1, 2], vec![3]);
        let b = EncryptedBlob::new(vec![1], vec![2, 3]);
        assert_ne!(blob_leaf_bytes(&a), blob_leaf_bytes(&b));
    }

    #[test]
    fn test_grants_bytes_order_independent() {
        let forward = grants_bytes(&[PermissionKind::Read, PermissionKind::Write]);
        let backward = grants_bytes(&[PermissionKind::Write, PermissionKind::Read]);
        let duplicated = grants_bytes(&[
            PermissionKind::Write,
            PermissionKind::Read,
            PermissionKind::Write,
        ]);
        assert_eq!(forward, backward);
        assert_eq!(forward, duplicated);
    }

    #[test]
    fn test_grants_bytes_layout() {
        // array(2), text(8) "READ_EMR", text(9) "WRITE_EMR"
        let bytes = grants_bytes(&[PermissionKind::Write, PermissionKind::Read]);
        let mut expected = vec![0x82, 0x68];
        expected.extend_from_slice(b"READ_EMR");
        expected.push(0x69);
        expected.extend_from_slice(b"WRITE_EMR");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_grants_roundtrip() {
        let grants: BTreeSet<_> = [PermissionKind::Write].into_iter().collect();
        let decoded = decode_grants(&grants_bytes(&grants)).unwrap();
        assert_eq!(decoded, grants);
    }

    #[test]
    fn test_decode_grants_rejects_garbage() {
        assert!(decode_grants(&[0xa0]).is_err());
        assert!(decode_grants(&[0x81, 0x01]).is_err());
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);
    }
}

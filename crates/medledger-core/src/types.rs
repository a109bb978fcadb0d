//! Strong type definitions for records and permissions.
//!
//! Identifiers are newtypes or closed enums so that a resource id cannot be
//! passed where a resource type is expected, and a subject type string never
//! reaches the ledger unparsed.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::blob_leaf_bytes;
use crate::crypto::Digest;
use crate::error::CoreError;

/// Identity of one record version: `(resource_type, resource_id, version_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// FHIR-style resource type, e.g. `Patient` or `Observation`.
    pub resource_type: String,
    /// Opaque resource identifier.
    pub resource_id: String,
    /// Version number, starting at 1.
    pub version_id: u64,
}

impl ResourceKey {
    /// Create a new resource key.
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        version_id: u64,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            version_id,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@v{}",
            self.resource_type, self.resource_id, self.version_id
        )
    }
}

/// Output of the re-encryption service. Never decrypted by this layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Re-encryption metadata.
    pub capsule: Bytes,
    /// The encrypted record body.
    pub ciphertext: Bytes,
}

impl EncryptedBlob {
    /// Create a blob from its two parts.
    pub fn new(capsule: impl Into<Bytes>, ciphertext: impl Into<Bytes>) -> Self {
        Self {
            capsule: capsule.into(),
            ciphertext: ciphertext.into(),
        }
    }

    /// The serialization that becomes a Merkle leaf.
    pub fn leaf_bytes(&self) -> Vec<u8> {
        blob_leaf_bytes(self)
    }

    /// `H(leaf_bytes)`.
    pub fn leaf_hash(&self) -> Digest {
        Digest::hash(&self.leaf_bytes())
    }
}

/// One stored record version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: ResourceKey,
    pub payload: EncryptedBlob,
}

impl Record {
    /// Create a new record.
    pub fn new(key: ResourceKey, payload: EncryptedBlob) -> Self {
        Self { key, payload }
    }
}

/// The kind of subject a permission set belongs to.
///
/// Each variant carries the numeric code used by the ledger's token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Doctor,
    Assistant,
    Patient,
}

impl SubjectType {
    /// All subject types.
    pub const ALL: [SubjectType; 3] = [
        SubjectType::Doctor,
        SubjectType::Assistant,
        SubjectType::Patient,
    ];

    /// Numeric encoding used on the ledger.
    pub const fn ledger_code(self) -> u8 {
        match self {
            SubjectType::Doctor => 1,
            SubjectType::Patient => 2,
            SubjectType::Assistant => 3,
        }
    }

    /// Decode a ledger code.
    pub const fn from_ledger_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SubjectType::Doctor),
            2 => Some(SubjectType::Patient),
            3 => Some(SubjectType::Assistant),
            _ => None,
        }
    }

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            SubjectType::Doctor => "doctor",
            SubjectType::Assistant => "assistant",
            SubjectType::Patient => "patient",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "doctor" => Ok(SubjectType::Doctor),
            "assistant" => Ok(SubjectType::Assistant),
            "patient" => Ok(SubjectType::Patient),
            _ => Err(CoreError::UnknownSubjectType(s.to_string())),
        }
    }
}

/// A single grantable permission.
///
/// The derived `Ord` is the canonical total order used before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
    #[serde(rename = "READ_EMR")]
    Read,
    #[serde(rename = "WRITE_EMR")]
    Write,
}

impl PermissionKind {
    /// All permission kinds, in canonical order.
    pub const ALL: [PermissionKind; 2] = [PermissionKind::Read, PermissionKind::Write];

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            PermissionKind::Read => "READ_EMR",
            PermissionKind::Write => "WRITE_EMR",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READ_EMR" | "READ" => Ok(PermissionKind::Read),
            "WRITE_EMR" | "WRITE" => Ok(PermissionKind::Write),
            _ => Err(CoreError::UnknownPermissionKind(s.to_string())),
        }
    }
}

/// Key of one permission set: `(subject_type, token_id, scope_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub subject_type: SubjectType,
    /// Ledger token id of the subject.
    pub token_id: u64,
    /// Resource scope, e.g. a hospital id.
    pub scope_id: u64,
}

impl PermissionKey {
    /// Create a new permission key.
    pub const fn new(subject_type: SubjectType, token_id: u64, scope_id: u64) -> Self {
        Self {
            subject_type,
            token_id,
            scope_id,
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.subject_type, self.token_id, self.scope_id
        )
    }
}

/// The grants held by one subject within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub subject_type: SubjectType,
    pub token_id: u64,
    pub scope_id: u64,
    pub grants: BTreeSet<PermissionKind>,
}

impl PermissionSet {
    /// Create a permission set for the given key.
    pub fn new(key: PermissionKey, grants: impl IntoIterator<Item = PermissionKind>) -> Self {
        Self {
            subject_type: key.subject_type,
            token_id: key.token_id,
            scope_id: key.scope_id,
            grants: grants.into_iter().collect(),
        }
    }

    /// The table key of this set.
    pub const fn key(&self) -> PermissionKey {
        PermissionKey::new(self.subject_type, self.token_id, self.scope_id)
    }

    /// Check whether a permission is granted.
    pub fn allows(&self, permission: PermissionKind) -> bool {
        self.grants.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_type_ledger_codes() {
        for subject in SubjectType::ALL {
            assert_eq!(
                SubjectType::from_ledger_code(subject.ledger_code()),
                Some(subject)
            );
        }
        assert_eq!(SubjectType::Doctor.ledger_code(), 1);
        assert_eq!(SubjectType::Patient.ledger_code(), 2);
        assert_eq!(SubjectType::Assistant.ledger_code(), 3);
        assert_eq!(SubjectType::from_ledger_code(0), None);
    }

    #[test]
    fn test_subject_type_parse() {
        assert_eq!("Doctor".parse::<SubjectType>().unwrap(), SubjectType::Doctor);
        assert!(matches!(
            "nurse".parse::<SubjectType>(),
            Err(CoreError::UnknownSubjectType(_))
        ));
    }

    #[test]
    fn test_permission_kind_parse_and_order() {
        assert_eq!("READ_EMR".parse::<PermissionKind>().unwrap(), PermissionKind::Read);
        assert_eq!("write".parse::<PermissionKind>().unwrap(), PermissionKind::Write);
        assert!(PermissionKind::Read < PermissionKind::Write);
    }

    #[test]
    fn test_permission_kind_serde_uses_wire_names() {
        let json = serde_json::to_string(&PermissionKind::Write).unwrap();
        assert_eq!(json, "\"WRITE_EMR\"");
    }

    #[test]
    fn test_resource_key_display() {
        let key = ResourceKey::new("Patient", "example-patient-1", 1);
        assert_eq!(key.to_string(), "Patient/example-patient-1@v1");
    }

    #[test]
    fn test_permission_set_allows() {
        let key = PermissionKey::new(SubjectType::Doctor, 7, 3);
        let set = PermissionSet::new(key, [PermissionKind::Read]);
        assert!(set.allows(PermissionKind::Read));
        assert!(!set.allows(PermissionKind::Write));
        assert_eq!(set.key(), key);
    }
}

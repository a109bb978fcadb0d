//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use medledger_core::{
    EncryptedBlob, PermissionKey, PermissionKind, PermissionSet, Record, ResourceKey, SubjectType,
};

/// Generate a subject type.
pub fn subject_type() -> impl Strategy<Value = SubjectType> {
    prop_oneof![
        Just(SubjectType::Doctor),
        Just(SubjectType::Assistant),
        Just(SubjectType::Patient),
    ]
}

/// Generate a permission kind.
pub fn permission_kind() -> impl Strategy<Value = PermissionKind> {
    prop_oneof![Just(PermissionKind::Read), Just(PermissionKind::Write)]
}

/// Generate a grant list, possibly with duplicates, in arbitrary order.
pub fn grant_list() -> impl Strategy<Value = Vec<PermissionKind>> {
    prop::collection::vec(permission_kind(), 0..6)
}

/// Generate a non-empty grant set.
pub fn grant_set() -> impl Strategy<Value = BTreeSet<PermissionKind>> {
    prop::collection::btree_set(permission_kind(), 1..=2)
}

/// Generate a valid permission key (token and scope ids start at 1).
pub fn permission_key() -> impl Strategy<Value = PermissionKey> {
    (subject_type(), 1u64..10_000, 1u64..100)
        .prop_map(|(subject, token, scope)| PermissionKey::new(subject, token, scope))
}

/// Generate a permission set.
pub fn permission_set() -> impl Strategy<Value = PermissionSet> {
    (permission_key(), grant_set()).prop_map(|(key, grants)| PermissionSet::new(key, grants))
}

/// Generate a resource type name.
pub fn resource_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Patient".to_string()),
        Just("Observation".to_string()),
        Just("Condition".to_string()),
        "[A-Z][a-zA-Z]{2,15}".prop_map(String::from),
    ]
}

/// Generate a resource key.
pub fn resource_key() -> impl Strategy<Value = ResourceKey> {
    (resource_type(), "[a-f0-9]{8,32}", 1u64..5)
        .prop_map(|(rt, id, version)| ResourceKey::new(rt, id, version))
}

/// Generate an opaque encrypted blob.
pub fn blob(max_len: usize) -> impl Strategy<Value = EncryptedBlob> {
    (
        prop::collection::vec(any::<u8>(), 0..=max_len),
        prop::collection::vec(any::<u8>(), 0..=max_len),
    )
        .prop_map(|(capsule, ciphertext)| EncryptedBlob::new(capsule, ciphertext))
}

/// Generate a record.
pub fn record() -> impl Strategy<Value = Record> {
    (resource_key(), blob(96)).prop_map(|(key, payload)| Record::new(key, payload))
}

/// Generate records with pairwise distinct keys.
pub fn record_set(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_map(resource_key(), blob(64), 1..=max).prop_map(|records| {
        records
            .into_iter()
            .map(|(key, payload)| Record::new(key, payload))
            .collect()
    })
}

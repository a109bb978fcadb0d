//! Permission commitment hash.
//!
//! The ledger stores one hash per `(subject_type, token_id, scope_id)`. It must
//! equal the hash of the canonical encoding of the off-chain grant set, so two
//! sets with the same members always commit to the same value.

use crate::canonical::grants_bytes;
use crate::crypto::{Digest, PermissionHash};
use crate::types::PermissionKind;

/// Hash a grant set: `H(canonical(grants))`.
pub fn commit_hash<'a>(grants: impl IntoIterator<Item = &'a PermissionKind>) -> PermissionHash {
    PermissionHash(Digest::hash(&grants_bytes(grants)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kind() -> impl Strategy<Value = PermissionKind> {
        prop_oneof![Just(PermissionKind::Read), Just(PermissionKind::Write)]
    }

    #[test]
    fn test_empty_and_full_differ() {
        let empty: [PermissionKind; 0] = [];
        assert_ne!(commit_hash(&empty), commit_hash(&PermissionKind::ALL));
    }

    #[test]
    fn test_read_vs_read_write() {
        let read = commit_hash(&[PermissionKind::Read]);
        let read_write = commit_hash(&[PermissionKind::Read, PermissionKind::Write]);
        assert_ne!(read, read_write);
    }

    proptest! {
        #[test]
        fn prop_commit_hash_ignores_order(grants in prop::collection::vec(kind(), 0..6)) {
            let mut reversed = grants.clone();
            reversed.reverse();
            prop_assert_eq!(commit_hash(&grants), commit_hash(&reversed));
        }

        #[test]
        fn prop_commit_hash_changes_with_extra_grant(grants in prop::collection::vec(kind(), 0..6)) {
            for extra in PermissionKind::ALL {
                if grants.contains(&extra) {
                    continue;
                }
                let mut extended = grants.clone();
                extended.push(extra);
                prop_assert_ne!(commit_hash(&grants), commit_hash(&extended));
            }
        }
    }
}

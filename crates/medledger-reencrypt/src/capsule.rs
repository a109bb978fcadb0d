//! Capsules: the content key of one record, wrapped to one user.
//!
//! Encrypting a record produces a capsule wrapped to the owner plus the
//! sealed body. Re-encryption unwraps the capsule with the owner's key and
//! wraps it again to a grantee; the body is never touched.

use serde::{Deserialize, Serialize};

use crate::crypto::{ContentKey, Ephemeral, SealNonce, UserPublicKey, UserSecretKey};
use crate::error::{ReEncryptError, Result};

/// Wire format version of a capsule.
const CAPSULE_VERSION: u8 = 1;

/// A content key wrapped to a single recipient via ephemeral X25519.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capsule {
    pub version: u8,
    /// Sender's side of the key agreement.
    pub ephemeral_public: UserPublicKey,
    /// The content key, sealed under the agreed wrap key.
    pub wrapped_key: Vec<u8>,
    pub key_nonce: SealNonce,
    /// Nonce the record body was sealed with.
    pub body_nonce: SealNonce,
}

impl Capsule {
    /// Wrap `content_key` to `recipient`.
    pub fn wrap(
        content_key: &ContentKey,
        body_nonce: SealNonce,
        recipient: &UserPublicKey,
    ) -> Result<Self> {
        let ephemeral = Ephemeral::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral.wrap_key_for(recipient);

        let key_nonce = SealNonce::generate();
        let wrapped_key = wrap_key.seal(content_key.as_bytes(), &key_nonce)?;

        Ok(Self {
            version: CAPSULE_VERSION,
            ephemeral_public,
            wrapped_key,
            key_nonce,
            body_nonce,
        })
    }

    /// Recover the content key with the recipient's secret.
    pub fn unwrap_key(&self, recipient: &UserSecretKey) -> Result<ContentKey> {
        let wrap_key = recipient.wrap_key_from(&self.ephemeral_public);
        let key_bytes = wrap_key.open(&self.wrapped_key, &self.key_nonce)?;
        ContentKey::from_slice(&key_bytes)
    }

    /// Re-wrap this capsule from its current recipient to another.
    pub fn reencrypt(&self, current: &UserSecretKey, next: &UserPublicKey) -> Result<Self> {
        let content_key = self.unwrap_key(current)?;
        Self::wrap(&content_key, self.body_nonce, next)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ReEncryptError::Encryption(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let capsule: Self = ciborium::from_reader(bytes)
            .map_err(|e| ReEncryptError::Decryption(format!("malformed capsule: {}", e)))?;
        if capsule.version != CAPSULE_VERSION {
            return Err(ReEncryptError::Decryption(format!(
                "unsupported capsule version {}",
                capsule.version
            )));
        }
        Ok(capsule)
    }
}

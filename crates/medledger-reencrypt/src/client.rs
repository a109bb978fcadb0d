//! The re-encryption service contract.

use async_trait::async_trait;
use medledger_core::EncryptedBlob;

use crate::error::Result;

/// Boundary to the proxy re-encryption service.
///
/// Records are encrypted to their owner. The owner delegates to grantees,
/// after which a grantee can have a blob re-encrypted to itself and opened.
/// This layer never sees key material.
#[async_trait]
pub trait ReEncryptionClient: Send + Sync {
    /// Encrypt `plaintext` under the owner's public key.
    async fn encrypt(&self, owner_id: &str, plaintext: &str) -> Result<EncryptedBlob>;

    /// Delegate decryption rights from the owner to each grantee.
    ///
    /// Safe to repeat; re-issuing a grant is harmless.
    async fn grant(&self, owner_id: &str, grantee_ids: &[String]) -> Result<()>;

    /// Decrypt a blob on behalf of `grantee_id`.
    ///
    /// The owner may always decrypt their own records.
    async fn decrypt(
        &self,
        owner_id: &str,
        grantee_id: &str,
        blob: &EncryptedBlob,
    ) -> Result<String>;

    /// Generate (or regenerate) the key pair of a user and return the public
    /// key in its transport encoding.
    async fn generate_keys(&self, user_id: &str) -> Result<String>;
}

//! In-process re-encryption service.
//!
//! Holds every user's secret key and every delegation in memory and performs
//! the owner → grantee capsule transformation itself. It honours the same
//! contract as the HTTP service and backs tests and offline tooling.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use medledger_core::EncryptedBlob;

use crate::capsule::Capsule;
use crate::client::ReEncryptionClient;
use crate::crypto::{ContentKey, SealNonce, UserPublicKey, UserSecretKey};
use crate::error::{ReEncryptError, Result};

#[derive(Default)]
struct LocalState {
    keys: HashMap<String, UserSecretKey>,
    /// Delegations as `(owner, grantee)`.
    delegations: HashSet<(String, String)>,
}

impl LocalState {
    fn secret(&self, user_id: &str) -> Result<&UserSecretKey> {
        self.keys
            .get(user_id)
            .ok_or_else(|| ReEncryptError::UnknownUser(user_id.to_string()))
    }
}

/// An in-memory re-encryption service.
#[derive(Default)]
pub struct LocalReEncryption {
    state: RwLock<LocalState>,
}

impl LocalReEncryption {
    /// Create a service with no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Public key of a user, if keys were generated.
    pub async fn public_key(&self, user_id: &str) -> Option<UserPublicKey> {
        self.state
            .read()
            .await
            .keys
            .get(user_id)
            .map(UserSecretKey::public_key)
    }

    /// Whether `owner_id` has delegated to `grantee_id`.
    pub async fn is_delegated(&self, owner_id: &str, grantee_id: &str) -> bool {
        self.state
            .read()
            .await
            .delegations
            .contains(&(owner_id.to_string(), grantee_id.to_string()))
    }
}

#[async_trait]
impl ReEncryptionClient for LocalReEncryption {
    async fn encrypt(&self, owner_id: &str, plaintext: &str) -> Result<EncryptedBlob> {
        let state = self.state.read().await;
        let owner_public = state.secret(owner_id)?.public_key();

        let content_key = ContentKey::generate();
        let body_nonce = SealNonce::generate();
        let ciphertext = content_key.seal(plaintext.as_bytes(), &body_nonce)?;
        let capsule = Capsule::wrap(&content_key, body_nonce, &owner_public)?;

        Ok(EncryptedBlob::new(capsule.to_bytes()?, ciphertext))
    }

    async fn grant(&self, owner_id: &str, grantee_ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        state.secret(owner_id)?;
        for grantee in grantee_ids {
            state.secret(grantee)?;
        }
        for grantee in grantee_ids {
            state
                .delegations
                .insert((owner_id.to_string(), grantee.clone()));
        }
        tracing::debug!(owner_id, grantees = grantee_ids.len(), "delegation granted");
        Ok(())
    }

    async fn decrypt(
        &self,
        owner_id: &str,
        grantee_id: &str,
        blob: &EncryptedBlob,
    ) -> Result<String> {
        let state = self.state.read().await;
        let owner_secret = state.secret(owner_id)?;
        let capsule = Capsule::from_bytes(&blob.capsule)?;

        let content_key = if grantee_id == owner_id {
            capsule.unwrap_key(owner_secret)?
        } else {
            if !state
                .delegations
                .contains(&(owner_id.to_string(), grantee_id.to_string()))
            {
                return Err(ReEncryptError::NotAuthorized {
                    owner: owner_id.to_string(),
                    grantee: grantee_id.to_string(),
                });
            }
            let grantee_secret = state.secret(grantee_id)?;
            capsule
                .reencrypt(owner_secret, &grantee_secret.public_key())?
                .unwrap_key(grantee_secret)?
        };

        let body = content_key.open(&blob.ciphertext, &capsule.body_nonce)?;
        String::from_utf8(body).map_err(|e| ReEncryptError::Decryption(e.to_string()))
    }

    async fn generate_keys(&self, user_id: &str) -> Result<String> {
        if user_id.is_empty() {
            return Err(ReEncryptError::Service {
                status: 400,
                message: "user_id is required".into(),
            });
        }
        let secret = UserSecretKey::generate();
        let public = secret.public_key();
        self.state
            .write()
            .await
            .keys
            .insert(user_id.to_string(), secret);
        Ok(public.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with(users: &[&str]) -> LocalReEncryption {
        let service = LocalReEncryption::new();
        for user in users {
            service.generate_keys(user).await.unwrap();
        }
        service
    }

    #[tokio::test]
    async fn test_owner_roundtrip() {
        let service = service_with(&["patient-1"]).await;
        let blob = service.encrypt("patient-1", "hr=72").await.unwrap();
        assert_ne!(blob.ciphertext.as_ref(), b"hr=72");

        let plaintext = service.decrypt("patient-1", "patient-1", &blob).await.unwrap();
        assert_eq!(plaintext, "hr=72");
    }

    #[tokio::test]
    async fn test_grantee_needs_delegation() {
        let service = service_with(&["patient-1", "doctor-1"]).await;
        let blob = service.encrypt("patient-1", "dx: flu").await.unwrap();

        assert!(matches!(
            service.decrypt("patient-1", "doctor-1", &blob).await,
            Err(ReEncryptError::NotAuthorized { .. })
        ));

        service
            .grant("patient-1", &["doctor-1".to_string()])
            .await
            .unwrap();
        assert!(service.is_delegated("patient-1", "doctor-1").await);
        assert_eq!(
            service.decrypt("patient-1", "doctor-1", &blob).await.unwrap(),
            "dx: flu"
        );
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let service = service_with(&["p", "d"]).await;
        let grantees = vec!["d".to_string()];
        service.grant("p", &grantees).await.unwrap();
        service.grant("p", &grantees).await.unwrap();
        assert!(service.is_delegated("p", "d").await);
    }

    #[tokio::test]
    async fn test_unknown_users_rejected() {
        let service = service_with(&["p"]).await;
        assert!(matches!(
            service.encrypt("nobody", "x").await,
            Err(ReEncryptError::UnknownUser(_))
        ));
        assert!(matches!(
            service.grant("p", &["ghost".to_string()]).await,
            Err(ReEncryptError::UnknownUser(_))
        ));
        assert!(!service.is_delegated("p", "ghost").await);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails() {
        let service = service_with(&["p"]).await;
        let blob = service.encrypt("p", "note").await.unwrap();
        let mut body = blob.ciphertext.to_vec();
        body[0] ^= 0xff;
        let tampered = EncryptedBlob::new(blob.capsule.clone(), body);

        assert!(matches!(
            service.decrypt("p", "p", &tampered).await,
            Err(ReEncryptError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_keys_returns_public_key() {
        let service = LocalReEncryption::new();
        let encoded = service.generate_keys("d-1").await.unwrap();
        let public = service.public_key("d-1").await.unwrap();
        assert_eq!(encoded, public.to_base64());
    }
}

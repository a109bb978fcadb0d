//! Key agreement and authenticated encryption primitives.
//!
//! X25519 for wrapping content keys to a user, ChaCha20-Poly1305 for both the
//! record body and the wrapped key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{ReEncryptError, Result};

/// Domain separator for keys derived from an ECDH secret.
const WRAP_KEY_CONTEXT: &str = "medledger-reencrypt-v1 capsule wrap key";

/// A user's X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPublicKey(pub [u8; 32]);

impl UserPublicKey {
    /// Base64 form, as returned by key generation.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

/// A user's X25519 secret key. Never leaves the service.
pub struct UserSecretKey(StaticSecret);

impl UserSecretKey {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> UserPublicKey {
        UserPublicKey(*PublicKey::from(&self.0).as_bytes())
    }

    /// Agree on a wrap key with the sender of an ephemeral public key.
    pub(crate) fn wrap_key_from(&self, ephemeral_public: &UserPublicKey) -> ContentKey {
        let shared = self.0.diffie_hellman(&ephemeral_public.to_dalek());
        derive_wrap_key(shared.as_bytes(), ephemeral_public)
    }
}

/// One-time key used to wrap a content key to a recipient.
pub(crate) struct Ephemeral {
    secret: EphemeralSecret,
    public: UserPublicKey,
}

impl Ephemeral {
    pub(crate) fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = UserPublicKey(*PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    pub(crate) fn public_key(&self) -> UserPublicKey {
        self.public
    }

    /// Consumes the ephemeral secret.
    pub(crate) fn wrap_key_for(self, recipient: &UserPublicKey) -> ContentKey {
        let shared = self.secret.diffie_hellman(&recipient.to_dalek());
        derive_wrap_key(shared.as_bytes(), &self.public)
    }
}

fn derive_wrap_key(shared: &[u8; 32], ephemeral_public: &UserPublicKey) -> ContentKey {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_KEY_CONTEXT);
    hasher.update(shared);
    hasher.update(&ephemeral_public.0);
    ContentKey(*hasher.finalize().as_bytes())
}

/// A 256-bit ChaCha20-Poly1305 key.
#[derive(Clone)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            ReEncryptError::Decryption(format!(
                "invalid key length: expected 32, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Seal `plaintext`; the tag is appended to the output.
    pub fn seal(&self, plaintext: &[u8], nonce: &SealNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ReEncryptError::Encryption(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| ReEncryptError::Encryption(e.to_string()))
    }

    /// Open a sealed message. Fails on any tampering or wrong key.
    pub fn open(&self, sealed: &[u8], nonce: &SealNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ReEncryptError::Decryption(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce.0), sealed)
            .map_err(|e| ReEncryptError::Decryption(e.to_string()))
    }
}

/// A 96-bit nonce, fresh per sealed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealNonce(pub [u8; 12]);

impl SealNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

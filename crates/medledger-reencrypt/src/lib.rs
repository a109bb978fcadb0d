//! # medledger re-encryption
//!
//! Boundary to the proxy re-encryption service that turns record plaintext
//! into `{capsule, ciphertext}` and back.
//!
//! ## Encryption Model
//!
//! A record is sealed once under a fresh content key (ChaCha20-Poly1305). The
//! content key is wrapped to the record owner in a capsule (X25519 ECDH).
//! Granting access records a delegation; when a grantee asks to decrypt, the
//! capsule is re-encrypted from the owner to the grantee. The body is never
//! re-encrypted, which is what lets access be added without rewriting
//! records, and therefore without moving the Merkle root.
//!
//! ## Implementations
//!
//! - [`HttpReEncryptionClient`] - talks to the external service over HTTP/JSON
//! - [`LocalReEncryption`] - performs the same operations in process
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medledger_reencrypt::{LocalReEncryption, ReEncryptionClient};
//!
//! async fn example() -> medledger_reencrypt::Result<()> {
//!     let service = LocalReEncryption::new();
//!     service.generate_keys("patient-1").await?;
//!     service.generate_keys("doctor-1").await?;
//!
//!     let blob = service.encrypt("patient-1", "allergies: none").await?;
//!     service.grant("patient-1", &["doctor-1".to_string()]).await?;
//!     let text = service.decrypt("patient-1", "doctor-1", &blob).await?;
//!     assert_eq!(text, "allergies: none");
//!     Ok(())
//! }
//! ```

pub mod capsule;
pub mod client;
pub mod crypto;
pub mod error;
pub mod http;
pub mod local;

pub use capsule::Capsule;
pub use client::ReEncryptionClient;
pub use crypto::{ContentKey, SealNonce, UserPublicKey, UserSecretKey};
pub use error::{ReEncryptError, Result};
pub use http::{HttpReEncryptionClient, ReEncryptConfig};
pub use local::LocalReEncryption;

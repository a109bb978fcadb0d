//! HTTP/JSON client for the external re-encryption service.
//!
//! Capsules and ciphertexts travel as base64 strings. Error responses carry
//! `{"error": "..."}` with a 4xx or 5xx status.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use medledger_core::EncryptedBlob;

use crate::client::ReEncryptionClient;
use crate::error::{ReEncryptError, Result};

/// Connection settings for the re-encryption service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReEncryptConfig {
    /// Base URL, without a trailing path.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ReEncryptConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    owner_id: &'a str,
    plaintext: &'a str,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct WireBlob {
    capsule: String,
    ciphertext: String,
}

/// The service may nest the blob under `EMR` or return it flat.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EncryptResponse {
    Nested {
        #[serde(rename = "EMR")]
        emr: WireBlob,
    },
    Flat(WireBlob),
}

impl EncryptResponse {
    fn into_blob(self) -> Result<EncryptedBlob> {
        let wire = match self {
            EncryptResponse::Nested { emr } => emr,
            EncryptResponse::Flat(wire) => wire,
        };
        Ok(EncryptedBlob::new(
            decode_field("capsule", &wire.capsule)?,
            decode_field("ciphertext", &wire.ciphertext)?,
        ))
    }
}

#[derive(Serialize)]
struct GrantRequest<'a> {
    owner_id: &'a str,
    grantee_ids: &'a [String],
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    owner_id: &'a str,
    grantee_id: &'a str,
    capsule: String,
    ciphertext: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

#[derive(Serialize)]
struct GenerateKeysRequest<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct GenerateKeysResponse {
    public_key: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| ReEncryptError::InvalidResponse(format!("{} is not base64: {}", name, e)))
}

fn transport_error(e: reqwest::Error) -> ReEncryptError {
    if e.is_timeout() {
        ReEncryptError::Transport(format!("request timed out: {}", e))
    } else {
        ReEncryptError::Transport(e.to_string())
    }
}

/// Client for the re-encryption service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpReEncryptionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpReEncryptionClient {
    /// Build a client from its configuration.
    pub fn new(config: &ReEncryptConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            tracing::warn!(path, status = status.as_u16(), %message, "re-encryption service error");
            return Err(ReEncryptError::Service {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ReEncryptError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl ReEncryptionClient for HttpReEncryptionClient {
    async fn encrypt(&self, owner_id: &str, plaintext: &str) -> Result<EncryptedBlob> {
        let response: EncryptResponse = self
            .post("encrypt_emr", &EncryptRequest { owner_id, plaintext })
            .await?;
        response.into_blob()
    }

    async fn grant(&self, owner_id: &str, grantee_ids: &[String]) -> Result<()> {
        let _ack: serde_json::Value = self
            .post(
                "generate_kfrags",
                &GrantRequest {
                    owner_id,
                    grantee_ids,
                },
            )
            .await?;
        Ok(())
    }

    async fn decrypt(
        &self,
        owner_id: &str,
        grantee_id: &str,
        blob: &EncryptedBlob,
    ) -> Result<String> {
        let request = DecryptRequest {
            owner_id,
            grantee_id,
            capsule: BASE64.encode(&blob.capsule),
            ciphertext: BASE64.encode(&blob.ciphertext),
        };
        let response: DecryptResponse = self.post("decrypt_emr", &request).await?;
        Ok(response.plaintext)
    }

    async fn generate_keys(&self, user_id: &str) -> Result<String> {
        let response: GenerateKeysResponse = self
            .post("generate_keys", &GenerateKeysRequest { user_id })
            .await?;
        Ok(response.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_response_nested() {
        let json = r#"{"EMR": {"capsule": "AQI=", "ciphertext": "Aw=="}}"#;
        let response: EncryptResponse = serde_json::from_str(json).unwrap();
        let blob = response.into_blob().unwrap();
        assert_eq!(blob, EncryptedBlob::new(vec![1, 2], vec![3]));
    }

    #[test]
    fn test_encrypt_response_flat() {
        let json = r#"{"capsule": "AQI=", "ciphertext": "Aw=="}"#;
        let response: EncryptResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.into_blob().unwrap(),
            EncryptedBlob::new(vec![1, 2], vec![3])
        );
    }

    #[test]
    fn test_encrypt_response_bad_base64() {
        let json = r#"{"capsule": "***", "ciphertext": "Aw=="}"#;
        let response: EncryptResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_blob(),
            Err(ReEncryptError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_request_field_names() {
        let grantees = vec!["d-1".to_string(), "d-2".to_string()];
        let json = serde_json::to_value(GrantRequest {
            owner_id: "p-1",
            grantee_ids: &grantees,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"owner_id": "p-1", "grantee_ids": ["d-1", "d-2"]})
        );

        let json = serde_json::to_value(DecryptRequest {
            owner_id: "p-1",
            grantee_id: "d-1",
            capsule: BASE64.encode([1u8, 2]),
            ciphertext: BASE64.encode([3u8]),
        })
        .unwrap();
        assert_eq!(json["capsule"], "AQI=");
        assert_eq!(json["grantee_id"], "d-1");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpReEncryptionClient::new(&ReEncryptConfig {
            base_url: "http://localhost:5000/".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Bind then drop a listener so the port is known to be closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = HttpReEncryptionClient::new(&ReEncryptConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        assert!(matches!(
            client.generate_keys("d-1").await,
            Err(ReEncryptError::Transport(_))
        ));
    }
}

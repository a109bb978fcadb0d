//! Runtime configuration.
//!
//! Built by the process entry point and handed to the orchestrator; nothing
//! in the library reads the environment on its own.

use std::time::Duration;

use medledger_reencrypt::{HttpReEncryptionClient, ReEncryptConfig};

use crate::error::{KernelError, Result};

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Bound on each record store and re-encryption call.
    pub call_timeout: Duration,
    /// Bound on each ledger call, including root publication.
    pub ledger_timeout: Duration,
    /// Also ask the ledger to verify inclusion proofs during integrity checks.
    pub verify_on_ledger: bool,
    /// HTTP client settings for the re-encryption service.
    pub reencrypt: ReEncryptConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            ledger_timeout: Duration::from_secs(30),
            verify_on_ledger: true,
            reencrypt: ReEncryptConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Defaults overlaid with `MEDLEDGER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// Recognized keys: `MEDLEDGER_CALL_TIMEOUT_MS`,
    /// `MEDLEDGER_LEDGER_TIMEOUT_MS`, `MEDLEDGER_VERIFY_ON_LEDGER`,
    /// `MEDLEDGER_REENCRYPT_URL`, `MEDLEDGER_REENCRYPT_TIMEOUT_MS`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("MEDLEDGER_CALL_TIMEOUT_MS") {
            config.call_timeout = parse_millis("MEDLEDGER_CALL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("MEDLEDGER_LEDGER_TIMEOUT_MS") {
            config.ledger_timeout = parse_millis("MEDLEDGER_LEDGER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("MEDLEDGER_VERIFY_ON_LEDGER") {
            config.verify_on_ledger = parse_bool("MEDLEDGER_VERIFY_ON_LEDGER", &value)?;
        }
        if let Some(value) = lookup("MEDLEDGER_REENCRYPT_URL") {
            if value.trim().is_empty() {
                return Err(KernelError::Config(
                    "MEDLEDGER_REENCRYPT_URL must not be empty".into(),
                ));
            }
            config.reencrypt.base_url = value.trim().to_string();
        }
        if let Some(value) = lookup("MEDLEDGER_REENCRYPT_TIMEOUT_MS") {
            config.reencrypt.timeout = parse_millis("MEDLEDGER_REENCRYPT_TIMEOUT_MS", &value)?;
        }

        Ok(config)
    }

    /// An HTTP client for the configured re-encryption service.
    pub fn reencrypt_client(&self) -> Result<HttpReEncryptionClient> {
        Ok(HttpReEncryptionClient::new(&self.reencrypt)?)
    }
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(KernelError::Config(format!("{} must be positive", name))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(KernelError::Config(format!(
            "{}={:?} is not a number of milliseconds: {}",
            name, value, e
        ))),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(KernelError::Config(format!(
            "{}={:?} is not a boolean",
            name, value
        ))),
    }
}

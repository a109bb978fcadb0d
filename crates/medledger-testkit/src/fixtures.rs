//! Test fixtures and helpers.
//!
//! [`Harness`] wires an [`Orchestrator`] over in-memory collaborators, each
//! wrapped in its fault-injecting counterpart, and keeps handles to all of
//! them so tests can arm faults or tamper with state directly.

use std::sync::Arc;
use std::time::Duration;

use medledger::{
    AddRecordRequest, AssignPermissionRequest, KernelConfig, Orchestrator,
    RegisterSubjectRequest, Result, WriteOutcome,
};
use medledger_core::{PermissionKey, PermissionKind, ResourceKey, SubjectType};
use medledger_ledger::{MemoryLedger, SubjectProfile};
use medledger_reencrypt::LocalReEncryption;
use medledger_store::MemoryStore;

use crate::faults::{FaultyLedger, FaultyReEncryption, FaultyStore};

pub type TestStore = FaultyStore<MemoryStore>;
pub type TestLedger = FaultyLedger<MemoryLedger>;
pub type TestReEncryption = FaultyReEncryption<LocalReEncryption>;
pub type TestOrchestrator = Orchestrator<TestStore, TestLedger, TestReEncryption>;

/// Short timeouts so injected hangs fail fast.
pub fn test_config() -> KernelConfig {
    KernelConfig {
        call_timeout: Duration::from_secs(2),
        ledger_timeout: Duration::from_millis(250),
        ..KernelConfig::default()
    }
}

/// A registered subject holding a permission set in one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub key: PermissionKey,
    /// Re-encryption identity.
    pub user_id: String,
}

/// A fully wired orchestrator with handles to its collaborators.
pub struct Harness {
    pub orchestrator: TestOrchestrator,
    pub store: Arc<TestStore>,
    pub ledger: Arc<TestLedger>,
    pub reencrypt: Arc<TestReEncryption>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MemoryLedger::new(), test_config())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self::build(MemoryLedger::new(), config)
    }

    /// Slow every ledger write down, to widen race windows.
    pub fn with_ledger_latency(latency: Duration) -> Self {
        let config = KernelConfig {
            ledger_timeout: Duration::from_secs(10),
            ..test_config()
        };
        Self::build(MemoryLedger::with_latency(latency), config)
    }

    fn build(ledger: MemoryLedger, config: KernelConfig) -> Self {
        let store = Arc::new(FaultyStore::new(MemoryStore::new()));
        let ledger = Arc::new(FaultyLedger::new(ledger));
        let reencrypt = Arc::new(FaultyReEncryption::new(LocalReEncryption::new()));
        let orchestrator =
            Orchestrator::new(store.clone(), ledger.clone(), reencrypt.clone(), config);
        Self {
            orchestrator,
            store,
            ledger,
            reencrypt,
        }
    }

    /// Register a subject and grant it `grants` within `scope_id`.
    pub async fn enroll(
        &self,
        subject_type: SubjectType,
        scope_id: u64,
        grants: &[PermissionKind],
    ) -> Result<Participant> {
        let registration = self
            .orchestrator
            .register_subject(RegisterSubjectRequest {
                subject_type,
                profile: profile(subject_type),
            })
            .await?;

        let key = PermissionKey::new(subject_type, registration.token_id, scope_id);
        self.orchestrator
            .assign_permission(AssignPermissionRequest {
                key,
                grants: grants.iter().copied().collect(),
            })
            .await?;

        Ok(Participant {
            key,
            user_id: registration.user_id,
        })
    }

    /// Add a record owned by `owner`, written by `writer`, readable by `writer`.
    pub async fn add(
        &self,
        writer: &Participant,
        owner: &Participant,
        plaintext: &str,
    ) -> Result<WriteOutcome> {
        self.orchestrator
            .add_record(add_request(writer, owner, plaintext))
            .await
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// An add request for an observation owned by `owner`, delegated to `writer`.
pub fn add_request(writer: &Participant, owner: &Participant, plaintext: &str) -> AddRecordRequest {
    AddRecordRequest {
        requester: writer.key,
        resource_type: "Observation".into(),
        owner_id: owner.user_id.clone(),
        grantee_ids: vec![writer.user_id.clone()],
        plaintext: plaintext.into(),
    }
}

/// A plausible profile for a subject type.
pub fn profile(subject_type: SubjectType) -> SubjectProfile {
    let name = match subject_type {
        SubjectType::Doctor => "Gregory",
        SubjectType::Assistant => "Carla",
        SubjectType::Patient => "Mario",
    };
    SubjectProfile::new(
        format!("0x{}", hex::encode(rand::random::<[u8; 20]>())),
        name,
        "Rossi",
        "RSSMRA80A01H501U",
    )
}

/// A FHIR-shaped observation body.
pub fn observation(id: u32) -> String {
    serde_json::json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"text": "Hemoglobin"},
        "valueQuantity": {"value": 13 + id % 3, "unit": "g/dL"},
        "note": format!("sample {id}"),
    })
    .to_string()
}

/// Key of a record that was never written.
pub fn missing_key() -> ResourceKey {
    ResourceKey::new("Observation", "does-not-exist", 1)
}

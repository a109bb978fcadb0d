//! The write/read path state machine.
//!
//! ```text
//! Validating → PermissionChecking → IntegrityChecking → Transforming
//!            → Persisting → Recommitting → Done
//! ```
//!
//! Any stage may end in `Failed`. Add skips `IntegrityChecking`; access skips
//! `Transforming` through `Recommitting` and decrypts instead. Nothing before
//! `Persisting` mutates state, so failures there have no side effects.
//!
//! `Persisting` and `Recommitting` run under a single commit lock per
//! orchestrator. Two writers rebuilding the tree from overlapping snapshots
//! would otherwise publish roots in the wrong order and lose an update.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::Instrument;

use medledger_core::{
    CoreError, EncryptedBlob, MerkleRoot, PermissionKey, PermissionKind, Record, ResourceKey,
};
use medledger_ledger::{LedgerClient, TxReceipt};
use medledger_reencrypt::ReEncryptionClient;
use medledger_store::{PutResult, Store};

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};
use crate::merkle::{CommitOutcome, IntegrityReport, MerkleCommitmentEngine};
use crate::permissions::PermissionCommitmentEngine;
use crate::request::{
    user_id, AccessRecordRequest, AddRecordRequest, AssignPermissionRequest, ReadOutcome,
    RegisterSubjectRequest, Registration, UpdateRecordRequest, WriteOutcome,
};
use crate::timeout::bounded;

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    Validating = 0,
    PermissionChecking = 1,
    IntegrityChecking = 2,
    Transforming = 3,
    Persisting = 4,
    Recommitting = 5,
    Decrypting = 6,
    Done = 7,
    Failed = 8,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::PermissionChecking => "permission_checking",
            Stage::IntegrityChecking => "integrity_checking",
            Stage::Transforming => "transforming",
            Stage::Persisting => "persisting",
            Stage::Recommitting => "recommitting",
            Stage::Decrypting => "decrypting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Stage::Validating,
            1 => Stage::PermissionChecking,
            2 => Stage::IntegrityChecking,
            3 => Stage::Transforming,
            4 => Stage::Persisting,
            5 => Stage::Recommitting,
            6 => Stage::Decrypting,
            7 => Stage::Done,
            _ => Stage::Failed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight operation: its id, name, and current stage.
struct Operation {
    id: String,
    name: &'static str,
    stage: AtomicU8,
}

impl Operation {
    fn begin(name: &'static str) -> Self {
        Self {
            id: hex::encode(rand::random::<[u8; 8]>()),
            name,
            stage: AtomicU8::new(Stage::Validating as u8),
        }
    }

    fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Acquire))
    }

    fn enter(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::Release);
        tracing::debug!(stage = %stage, "stage entered");
    }

    /// Attach the target record to the operation's span.
    fn bind(&self, key: &ResourceKey) {
        let span = tracing::Span::current();
        span.record("resource_type", key.resource_type.as_str());
        span.record("resource_id", key.resource_id.as_str());
        span.record("version_id", key.version_id);
    }

    /// Run `work` inside this operation's span and log how it ended.
    async fn observe<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let span = tracing::info_span!(
            "medledger_op",
            op_id = %self.id,
            op = self.name,
            resource_type = tracing::field::Empty,
            resource_id = tracing::field::Empty,
            version_id = tracing::field::Empty,
        );
        async {
            let result = work.await;
            self.finish(&result);
            result
        }
        .instrument(span)
        .await
    }

    fn finish<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => {
                self.enter(Stage::Done);
                tracing::info!("operation complete");
            }
            Err(err) => {
                let reached = self.stage();
                self.stage.store(Stage::Failed as u8, Ordering::Release);
                if let KernelError::PartialCommit { root, .. } = err {
                    tracing::error!(
                        stage = %reached,
                        root = ?root.map(|r| r.to_hex()),
                        error = %err,
                        "record persisted but root not published; reconciliation required"
                    );
                } else {
                    tracing::warn!(stage = %reached, kind = %err.kind(), error = %err, "operation failed");
                }
            }
        }
    }
}

/// Coordinates the record store, ledger and re-encryption service.
///
/// Collaborators are injected at construction; the orchestrator owns no
/// process-wide state.
pub struct Orchestrator<S, L, R> {
    store: Arc<S>,
    ledger: Arc<L>,
    reencrypt: Arc<R>,
    merkle: MerkleCommitmentEngine<S, L>,
    permissions: PermissionCommitmentEngine<S, L>,
    /// Held from `Persisting` through `Recommitting`.
    commit_lock: Mutex<()>,
    config: KernelConfig,
}

impl<S, L, R> Orchestrator<S, L, R>
where
    S: Store,
    L: LedgerClient,
    R: ReEncryptionClient,
{
    /// Create an orchestrator over the given collaborators.
    pub fn new(store: Arc<S>, ledger: Arc<L>, reencrypt: Arc<R>, config: KernelConfig) -> Self {
        Self {
            merkle: MerkleCommitmentEngine::new(store.clone(), ledger.clone(), &config),
            permissions: PermissionCommitmentEngine::new(store.clone(), ledger.clone(), &config),
            store,
            ledger,
            reencrypt,
            commit_lock: Mutex::new(()),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn reencrypt(&self) -> &Arc<R> {
        &self.reencrypt
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn merkle(&self) -> &MerkleCommitmentEngine<S, L> {
        &self.merkle
    }

    pub fn permissions(&self) -> &PermissionCommitmentEngine<S, L> {
        &self.permissions
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt and store a new record, then publish the new root.
    pub async fn add_record(&self, request: AddRecordRequest) -> Result<WriteOutcome> {
        let op = Operation::begin("add");
        op.observe(self.run_add(&op, request)).await
    }

    /// Replace an existing record's payload, then publish the new root.
    ///
    /// Refuses to touch a record while the store disagrees with the ledger.
    pub async fn update_record(&self, request: UpdateRecordRequest) -> Result<WriteOutcome> {
        let op = Operation::begin("update");
        op.observe(self.run_update(&op, request)).await
    }

    /// Verify a record against the ledger and decrypt it for the reader.
    pub async fn access_record(&self, request: AccessRecordRequest) -> Result<ReadOutcome> {
        let op = Operation::begin("access");
        op.observe(self.run_access(&op, request)).await
    }

    /// Report how a record stands against the committed root.
    pub async fn check_integrity(&self, key: &ResourceKey) -> Result<IntegrityReport> {
        let op = Operation::begin("check_integrity");
        op.observe(async {
            op.bind(key);
            op.enter(Stage::IntegrityChecking);
            self.merkle.check_record(key).await
        })
        .await
    }

    /// Rebuild the tree from the current store and publish its root.
    ///
    /// This is the recovery path after a [`KernelError::PartialCommit`]. It
    /// re-runs only the commit and is safe to repeat.
    pub async fn reconcile(&self) -> Result<CommitOutcome> {
        let op = Operation::begin("reconcile");
        op.observe(self.run_reconcile(&op)).await
    }

    /// The root currently published on the ledger.
    pub async fn current_root(&self) -> Result<Option<MerkleRoot>> {
        self.merkle.ledger_root().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions and Subjects
    // ─────────────────────────────────────────────────────────────────────────

    /// Commit a permission set on the ledger and store it.
    pub async fn assign_permission(&self, request: AssignPermissionRequest) -> Result<TxReceipt> {
        let op = Operation::begin("assign_permission");
        op.observe(self.run_assign(&op, request)).await
    }

    /// Check a permission against its ledger commitment.
    pub async fn verify_permission(
        &self,
        key: &PermissionKey,
        required: PermissionKind,
    ) -> Result<bool> {
        self.permissions.verify(key, required).await
    }

    /// Mint an identity token and generate the subject's key pair.
    pub async fn register_subject(&self, request: RegisterSubjectRequest) -> Result<Registration> {
        let op = Operation::begin("register_subject");
        op.observe(self.run_register(&op, request)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────────────────────────

    async fn run_add(&self, op: &Operation, request: AddRecordRequest) -> Result<WriteOutcome> {
        request.validate()?;

        op.enter(Stage::PermissionChecking);
        self.authorize(&request.requester, PermissionKind::Write).await?;

        op.enter(Stage::Transforming);
        let payload = self.seal(&request.owner_id, &request.grantee_ids, &request.plaintext).await?;

        let key = ResourceKey::new(request.resource_type, new_resource_id(), 1);
        op.bind(&key);
        self.persist_and_commit(op, Record::new(key, payload)).await
    }

    async fn run_update(&self, op: &Operation, request: UpdateRecordRequest) -> Result<WriteOutcome> {
        request.validate()?;
        op.bind(&request.key);

        op.enter(Stage::PermissionChecking);
        self.authorize(&request.requester, PermissionKind::Write).await?;

        op.enter(Stage::IntegrityChecking);
        self.require_consistent(&request.key).await?;

        op.enter(Stage::Transforming);
        let payload = self.seal(&request.owner_id, &request.grantee_ids, &request.plaintext).await?;

        self.persist_and_commit(op, Record::new(request.key, payload)).await
    }

    async fn run_access(&self, op: &Operation, request: AccessRecordRequest) -> Result<ReadOutcome> {
        request.validate()?;
        op.bind(&request.key);

        op.enter(Stage::PermissionChecking);
        self.authorize(&request.requester, PermissionKind::Read).await?;

        op.enter(Stage::IntegrityChecking);
        let record = self.require_consistent(&request.key).await?;

        op.enter(Stage::Decrypting);
        let plaintext = bounded(
            self.config.call_timeout,
            "decrypt",
            self.reencrypt
                .decrypt(&request.owner_id, &request.reader_id, &record.payload),
        )
        .await?;

        Ok(ReadOutcome {
            success: true,
            op_id: op.id.clone(),
            key: request.key,
            plaintext,
        })
    }

    async fn run_reconcile(&self, op: &Operation) -> Result<CommitOutcome> {
        let _guard = self.commit_lock.lock().await;
        let count =
            bounded(self.config.call_timeout, "record_count", self.store.record_count()).await?;
        if count == 0 {
            return Err(CoreError::EmptyInput.into());
        }
        self.recommit(op).await
    }

    async fn run_assign(&self, op: &Operation, request: AssignPermissionRequest) -> Result<TxReceipt> {
        request.validate()?;

        op.enter(Stage::Persisting);
        self.permissions.assign(&request.to_set()).await
    }

    async fn run_register(
        &self,
        op: &Operation,
        request: RegisterSubjectRequest,
    ) -> Result<Registration> {
        request.validate()?;

        op.enter(Stage::Persisting);
        let (token_id, receipt) = bounded(
            self.config.ledger_timeout,
            "mint_subject",
            self.ledger.mint_subject(request.subject_type, &request.profile),
        )
        .await?;

        // The token exists from here on; a key failure is retried with
        // generate_keys alone.
        op.enter(Stage::Transforming);
        let user_id = user_id(request.subject_type, token_id);
        let public_key = bounded(
            self.config.call_timeout,
            "generate_keys",
            self.reencrypt.generate_keys(&user_id),
        )
        .await?;

        tracing::info!(
            subject = %request.subject_type,
            token_id,
            user_id = %user_id,
            "subject registered"
        );
        Ok(Registration {
            subject_type: request.subject_type,
            token_id,
            user_id,
            public_key,
            receipt,
        })
    }

    async fn authorize(&self, requester: &PermissionKey, required: PermissionKind) -> Result<()> {
        if self.permissions.verify(requester, required).await? {
            Ok(())
        } else {
            Err(KernelError::NotAuthorized {
                key: *requester,
                required,
            })
        }
    }

    /// Load a record and confirm it verifies against the committed root.
    async fn require_consistent(&self, key: &ResourceKey) -> Result<Record> {
        let record = bounded(self.config.call_timeout, "get_record", self.store.get_record(key))
            .await?
            .ok_or_else(|| KernelError::RecordNotFound(key.clone()))?;

        let report = self.merkle.check_record(key).await?;
        if !report.is_consistent() || report.leaf_hash != record.payload.leaf_hash() {
            return Err(KernelError::IntegrityMismatch(report.describe_failure()));
        }
        Ok(record)
    }

    async fn seal(
        &self,
        owner_id: &str,
        grantee_ids: &[String],
        plaintext: &str,
    ) -> Result<EncryptedBlob> {
        let payload = bounded(
            self.config.call_timeout,
            "encrypt",
            self.reencrypt.encrypt(owner_id, plaintext),
        )
        .await?;
        if !grantee_ids.is_empty() {
            bounded(
                self.config.call_timeout,
                "grant",
                self.reencrypt.grant(owner_id, grantee_ids),
            )
            .await?;
        }
        Ok(payload)
    }

    async fn persist_and_commit(&self, op: &Operation, record: Record) -> Result<WriteOutcome> {
        let _guard = self.commit_lock.lock().await;

        op.enter(Stage::Persisting);
        let put = match bounded(
            self.config.call_timeout,
            "put_record",
            self.store.put_record(&record),
        )
        .await
        {
            Ok(put) => Some(put),
            // The write may still land after the timeout. Commit it if it is
            // already visible; otherwise the outcome is unknown and only
            // reconcile can settle it.
            Err(err @ KernelError::Timeout { .. }) => {
                if !self.is_persisted(&record).await {
                    return Err(KernelError::partial_commit(None, err));
                }
                tracing::warn!(%err, "record visible despite unacknowledged write");
                None
            }
            Err(err) => return Err(err),
        };
        tracing::info!(
            resource_type = %record.key.resource_type,
            resource_id = %record.key.resource_id,
            version_id = record.key.version_id,
            acknowledged = put.is_some(),
            replaced = put == Some(PutResult::Replaced),
            "record persisted"
        );

        let commit = self.recommit(op).await?;
        Ok(WriteOutcome {
            success: true,
            op_id: op.id.clone(),
            key: record.key,
            new_root: commit.root,
            receipt: commit.receipt,
        })
    }

    /// Whether the store already holds exactly this record.
    async fn is_persisted(&self, record: &Record) -> bool {
        matches!(
            bounded(
                self.config.call_timeout,
                "get_record",
                self.store.get_record(&record.key),
            )
            .await,
            Ok(Some(stored)) if stored.payload == record.payload
        )
    }

    /// Rebuild and publish. Callers must hold the commit lock.
    ///
    /// Every failure here is a partial commit: the store already changed.
    async fn recommit(&self, op: &Operation) -> Result<CommitOutcome> {
        op.enter(Stage::Recommitting);
        let tree = self
            .merkle
            .snapshot()
            .await
            .map_err(|e| KernelError::partial_commit(None, e))?;
        let root = tree.root();
        tracing::debug!(root = %root, leaves = tree.leaf_count(), "publishing root");
        self.merkle
            .publish(&tree)
            .await
            .map_err(|e| KernelError::partial_commit(Some(root), e))
    }
}

/// A fresh 128-bit resource id, hex encoded.
fn new_resource_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use medledger_core::{Digest, PermissionSet, SubjectType};
    use medledger_ledger::{MemoryLedger, SubjectProfile};
    use medledger_reencrypt::LocalReEncryption;
    use medledger_store::{MemoryStore, PermissionStore, RecordStore};

    type TestOrchestrator = Orchestrator<MemoryStore, MemoryLedger, LocalReEncryption>;

    const DOCTOR: PermissionKey = PermissionKey::new(SubjectType::Doctor, 1, 1);

    async fn orchestrator() -> TestOrchestrator {
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryLedger::new()),
            Arc::new(LocalReEncryption::new()),
            KernelConfig::default(),
        );
        orchestrator.reencrypt().generate_keys("patient-1").await.unwrap();
        orchestrator.reencrypt().generate_keys("doctor-1").await.unwrap();
        orchestrator
            .assign_permission(AssignPermissionRequest {
                key: DOCTOR,
                grants: PermissionKind::ALL.into_iter().collect(),
            })
            .await
            .unwrap();
        orchestrator
    }

    fn add(plaintext: &str) -> AddRecordRequest {
        AddRecordRequest {
            requester: DOCTOR,
            resource_type: "Observation".into(),
            owner_id: "patient-1".into(),
            grantee_ids: vec!["doctor-1".into()],
            plaintext: plaintext.into(),
        }
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in [
            Stage::Validating,
            Stage::PermissionChecking,
            Stage::IntegrityChecking,
            Stage::Transforming,
            Stage::Persisting,
            Stage::Recommitting,
            Stage::Decrypting,
            Stage::Done,
            Stage::Failed,
        ] {
            assert_eq!(Stage::from_u8(stage as u8), stage);
        }
    }

    #[tokio::test]
    async fn test_add_then_access() {
        let orchestrator = orchestrator().await;
        let written = orchestrator.add_record(add("hb 13.2")).await.unwrap();
        assert!(written.success);
        assert_eq!(written.key.version_id, 1);
        assert_eq!(written.key.resource_id.len(), 32);
        assert_eq!(orchestrator.current_root().await.unwrap(), Some(written.new_root));

        let read = orchestrator
            .access_record(AccessRecordRequest {
                requester: DOCTOR,
                key: written.key.clone(),
                owner_id: "patient-1".into(),
                reader_id: "doctor-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(read.plaintext, "hb 13.2");
    }

    #[tokio::test]
    async fn test_update_moves_root() {
        let orchestrator = orchestrator().await;
        let written = orchestrator.add_record(add("v1")).await.unwrap();

        let updated = orchestrator
            .update_record(UpdateRecordRequest {
                requester: DOCTOR,
                key: written.key.clone(),
                owner_id: "patient-1".into(),
                grantee_ids: vec![],
                plaintext: "v2".into(),
            })
            .await
            .unwrap();
        assert_ne!(updated.new_root, written.new_root);
        assert_eq!(updated.key, written.key);
        assert_eq!(orchestrator.store().record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_validation_fails_before_side_effects() {
        let orchestrator = orchestrator().await;
        let mut request = add("x");
        request.resource_type.clear();

        let err = orchestrator.add_record(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(orchestrator.store().record_count().await.unwrap(), 0);
        assert_eq!(orchestrator.current_root().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_without_grant_is_denied() {
        let orchestrator = orchestrator().await;
        let reader = PermissionKey::new(SubjectType::Assistant, 1, 1);
        orchestrator
            .assign_permission(AssignPermissionRequest {
                key: reader,
                grants: [PermissionKind::Read].into_iter().collect(),
            })
            .await
            .unwrap();

        let mut request = add("x");
        request.requester = reader;
        let err = orchestrator.add_record(request).await.unwrap_err();
        assert!(matches!(
            err,
            KernelError::NotAuthorized { required: PermissionKind::Write, .. }
        ));
        assert_eq!(orchestrator.store().record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tampered_permissions_block_writes() {
        let orchestrator = orchestrator().await;
        orchestrator
            .store()
            .put_permissions(&PermissionSet::new(DOCTOR, [PermissionKind::Read]))
            .await
            .unwrap();

        let err = orchestrator.add_record(add("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    }

    #[tokio::test]
    async fn test_update_refuses_out_of_sync_store() {
        let orchestrator = orchestrator().await;
        let written = orchestrator.add_record(add("v1")).await.unwrap();

        // Change the payload behind the orchestrator's back.
        let tampered = Record::new(
            written.key.clone(),
            EncryptedBlob::new(vec![0u8; 4], vec![1u8; 4]),
        );
        orchestrator.store().put_record(&tampered).await.unwrap();

        let err = orchestrator
            .update_record(UpdateRecordRequest {
                requester: DOCTOR,
                key: written.key,
                owner_id: "patient-1".into(),
                grantee_ids: vec![],
                plaintext: "v2".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    }

    #[tokio::test]
    async fn test_access_unknown_record() {
        let orchestrator = orchestrator().await;
        let err = orchestrator
            .access_record(AccessRecordRequest {
                requester: DOCTOR,
                key: ResourceKey::new("Observation", "missing", 1),
                owner_id: "patient-1".into(),
                reader_id: "doctor-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_reconcile_empty_store() {
        let orchestrator = orchestrator().await;
        let err = orchestrator.reconcile().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let orchestrator = orchestrator().await;
        let written = orchestrator.add_record(add("x")).await.unwrap();

        let first = orchestrator.reconcile().await.unwrap();
        let second = orchestrator.reconcile().await.unwrap();
        assert_eq!(first.root, written.new_root);
        assert_eq!(second.root, first.root);
        assert!(second.receipt.block_number > first.receipt.block_number);
    }

    #[tokio::test]
    async fn test_register_subject() {
        let orchestrator = orchestrator().await;
        let registration = orchestrator
            .register_subject(RegisterSubjectRequest {
                subject_type: SubjectType::Patient,
                profile: SubjectProfile::new("0xabc", "Ada", "Lovelace", "LVLDAA85"),
            })
            .await
            .unwrap();

        assert_eq!(registration.token_id, 1);
        assert_eq!(registration.user_id, "patient-1");
        assert!(!registration.public_key.is_empty());
        assert!(orchestrator
            .ledger()
            .get_subject(SubjectType::Patient, 1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_check_integrity_reports_without_failing() {
        let orchestrator = orchestrator().await;
        let written = orchestrator.add_record(add("x")).await.unwrap();

        let report = orchestrator.check_integrity(&written.key).await.unwrap();
        assert!(report.is_consistent());

        orchestrator
            .ledger()
            .set_root(MerkleRoot(Digest::hash(b"elsewhere")))
            .await
            .unwrap();
        let report = orchestrator.check_integrity(&written.key).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.ledger_valid, Some(false));
    }
}

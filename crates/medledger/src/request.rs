//! Operation payloads and their results.
//!
//! Every request validates its own fields before the orchestrator makes any
//! external call.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use medledger_core::{
    MerkleRoot, PermissionKey, PermissionKind, PermissionSet, ResourceKey, SubjectType,
};
use medledger_ledger::{SubjectProfile, TxReceipt};

use crate::error::{KernelError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Store a new record, version 1 under a fresh resource id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRecordRequest {
    /// Who is writing; must hold `WRITE_EMR`.
    pub requester: PermissionKey,
    pub resource_type: String,
    /// Re-encryption identity the record is encrypted to.
    pub owner_id: String,
    /// Identities the owner delegates decryption to.
    #[serde(default)]
    pub grantee_ids: Vec<String>,
    pub plaintext: String,
}

impl AddRecordRequest {
    pub fn validate(&self) -> Result<()> {
        check_requester(&self.requester)?;
        require_text("resource_type", &self.resource_type)?;
        require_text("owner_id", &self.owner_id)?;
        check_grantees(&self.grantee_ids)?;
        require_text("plaintext", &self.plaintext)
    }
}

/// Replace the payload of an existing record version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecordRequest {
    pub requester: PermissionKey,
    pub key: ResourceKey,
    pub owner_id: String,
    #[serde(default)]
    pub grantee_ids: Vec<String>,
    pub plaintext: String,
}

impl UpdateRecordRequest {
    pub fn validate(&self) -> Result<()> {
        check_requester(&self.requester)?;
        check_resource_key(&self.key)?;
        require_text("owner_id", &self.owner_id)?;
        check_grantees(&self.grantee_ids)?;
        require_text("plaintext", &self.plaintext)
    }
}

/// Read and decrypt a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecordRequest {
    /// Who is reading; must hold `READ_EMR`.
    pub requester: PermissionKey,
    pub key: ResourceKey,
    pub owner_id: String,
    /// Re-encryption identity the plaintext is released to.
    pub reader_id: String,
}

impl AccessRecordRequest {
    pub fn validate(&self) -> Result<()> {
        check_requester(&self.requester)?;
        check_resource_key(&self.key)?;
        require_text("owner_id", &self.owner_id)?;
        require_text("reader_id", &self.reader_id)
    }
}

/// Replace a subject's grants within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignPermissionRequest {
    pub key: PermissionKey,
    pub grants: BTreeSet<PermissionKind>,
}

impl AssignPermissionRequest {
    pub fn validate(&self) -> Result<()> {
        check_requester(&self.key)?;
        if self.grants.is_empty() {
            return Err(KernelError::InvalidRequest(
                "grants must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The permission set this request installs.
    pub fn to_set(&self) -> PermissionSet {
        PermissionSet::new(self.key, self.grants.iter().copied())
    }
}

/// Mint an identity token and generate the subject's keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSubjectRequest {
    pub subject_type: SubjectType,
    pub profile: SubjectProfile,
}

impl RegisterSubjectRequest {
    pub fn validate(&self) -> Result<()> {
        require_text("address", &self.profile.address)?;
        require_text("name", &self.profile.name)?;
        require_text("surname", &self.profile.surname)?;
        require_text("tax_code", &self.profile.tax_code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a successful add or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub success: bool,
    /// Correlates with the `op_id` field in logs.
    pub op_id: String,
    pub key: ResourceKey,
    pub new_root: MerkleRoot,
    pub receipt: TxReceipt,
}

/// Result of a successful access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadOutcome {
    pub success: bool,
    pub op_id: String,
    pub key: ResourceKey,
    pub plaintext: String,
}

/// Result of registering a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub subject_type: SubjectType,
    pub token_id: u64,
    /// Identity used with the re-encryption service, e.g. `doctor-7`.
    pub user_id: String,
    pub public_key: String,
    pub receipt: TxReceipt,
}

/// Re-encryption identity of a registered subject.
pub fn user_id(subject_type: SubjectType, token_id: u64) -> String {
    format!("{subject_type}-{token_id}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Field checks
// ─────────────────────────────────────────────────────────────────────────────

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(KernelError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

fn check_requester(key: &PermissionKey) -> Result<()> {
    if key.token_id == 0 {
        return Err(KernelError::InvalidRequest("token_id must be at least 1".into()));
    }
    if key.scope_id == 0 {
        return Err(KernelError::InvalidRequest("scope_id must be at least 1".into()));
    }
    Ok(())
}

fn check_resource_key(key: &ResourceKey) -> Result<()> {
    require_text("resource_type", &key.resource_type)?;
    require_text("resource_id", &key.resource_id)?;
    if key.version_id == 0 {
        return Err(KernelError::InvalidRequest("version_id must be at least 1".into()));
    }
    Ok(())
}

fn check_grantees(grantee_ids: &[String]) -> Result<()> {
    grantee_ids
        .iter()
        .try_for_each(|id| require_text("grantee_ids[]", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn doctor() -> PermissionKey {
        PermissionKey::new(SubjectType::Doctor, 7, 3)
    }

    fn add() -> AddRecordRequest {
        AddRecordRequest {
            requester: doctor(),
            resource_type: "Observation".into(),
            owner_id: "patient-1".into(),
            grantee_ids: vec!["doctor-7".into()],
            plaintext: "{\"status\":\"final\"}".into(),
        }
    }

    #[test]
    fn test_valid_add() {
        add().validate().unwrap();
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut request = add();
        request.plaintext = "  ".into();
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::Validation);

        let mut request = add();
        request.grantee_ids.push(String::new());
        assert!(request.validate().is_err());

        let mut request = add();
        request.requester.token_id = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_update_requires_version() {
        let request = UpdateRecordRequest {
            requester: doctor(),
            key: ResourceKey::new("Observation", "abc", 0),
            owner_id: "patient-1".into(),
            grantee_ids: vec![],
            plaintext: "x".into(),
        };
        assert!(matches!(
            request.validate(),
            Err(KernelError::InvalidRequest(msg)) if msg.contains("version_id")
        ));
    }

    #[test]
    fn test_assign_rejects_empty_grants() {
        let request = AssignPermissionRequest {
            key: doctor(),
            grants: BTreeSet::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_register_requires_profile() {
        let request = RegisterSubjectRequest {
            subject_type: SubjectType::Patient,
            profile: SubjectProfile::new("0xabc", "Ada", "", "LVLDAA85"),
        };
        assert!(matches!(
            request.validate(),
            Err(KernelError::InvalidRequest(msg)) if msg.contains("surname")
        ));
    }

    #[test]
    fn test_add_request_from_json() {
        let json = r#"{
            "requester": {"subject_type": "doctor", "token_id": 7, "scope_id": 3},
            "resource_type": "Patient",
            "owner_id": "patient-1",
            "plaintext": "{}"
        }"#;
        let request: AddRecordRequest = serde_json::from_str(json).unwrap();
        assert!(request.grantee_ids.is_empty());
        assert_eq!(request.requester, doctor());
    }

    #[test]
    fn test_user_id_format() {
        assert_eq!(user_id(SubjectType::Doctor, 7), "doctor-7");
    }
}

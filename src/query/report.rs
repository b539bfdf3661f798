//! Verification request and report types

use serde::Serialize;
use uuid::Uuid;

/// What to verify
#[derive(Debug, Clone)]
pub enum VerifyTarget {
    /// Every stored record of a chain, from its anchor
    Chain(String),
    /// Individual records, each against its stored predecessor
    Records(Vec<Uuid>),
}

impl VerifyTarget {
    /// Label persisted with the verification run
    pub fn label(&self) -> String {
        match self {
            VerifyTarget::Chain(key) => format!("chain:{}", key),
            VerifyTarget::Records(ids) => format!("records:{}", ids.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Valid,
    Tampered,
    NotFound,
}

/// Outcome for one record of a record-set verification
#[derive(Debug, Clone, Serialize)]
pub struct RecordCheck {
    pub record_id: Uuid,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a verify call
///
/// `results` is filled for record sets; chain verification reports only the
/// first divergence.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub first_invalid_record_id: Option<Uuid>,
    pub checked_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub results: Vec<RecordCheck>,
}

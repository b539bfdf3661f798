//! Chain verification

use uuid::Uuid;

use super::{content_hash, ChainAnchor};
use crate::traits::EventRecord;

/// Result of walking a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    /// Records examined, including the first invalid one
    pub checked_count: u64,
    pub first_invalid_record_id: Option<Uuid>,
    pub error_message: Option<String>,
}

impl ChainVerification {
    pub fn empty() -> Self {
        Self {
            valid: true,
            checked_count: 0,
            first_invalid_record_id: None,
            error_message: None,
        }
    }
}

/// Recompute a record's content hash from its stored fields
pub fn recompute_hash(record: &EventRecord) -> [u8; 32] {
    content_hash(&record.chain_fields(), record.sequence_no, &record.prev_hash)
}

/// Check one record against the position and predecessor hash it must have
pub fn verify_link(
    record: &EventRecord,
    expected_sequence: u64,
    expected_prev: &[u8; 32],
) -> Result<(), String> {
    if record.sequence_no != expected_sequence {
        return Err(format!(
            "sequence gap: expected {}, found {}",
            expected_sequence, record.sequence_no
        ));
    }
    if &record.prev_hash != expected_prev {
        return Err(format!(
            "prev_hash {} does not match predecessor {}",
            hex::encode(record.prev_hash),
            hex::encode(expected_prev)
        ));
    }
    let computed = recompute_hash(record);
    if computed != record.content_hash {
        return Err(format!(
            "content hash mismatch: stored {}, computed {}",
            hex::encode(record.content_hash),
            hex::encode(computed)
        ));
    }
    Ok(())
}

/// Verify records of one chain, in ascending sequence order, starting at
/// `anchor`
///
/// Stops at the first divergence.
pub fn verify_chain<'a, I>(records: I, anchor: ChainAnchor) -> ChainVerification
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut expected_sequence = anchor.next_sequence;
    let mut expected_prev = anchor.prev_hash;
    let mut checked = 0u64;

    for record in records {
        checked += 1;
        if let Err(e) = verify_link(record, expected_sequence, &expected_prev) {
            return ChainVerification {
                valid: false,
                checked_count: checked,
                first_invalid_record_id: Some(record.record_id),
                error_message: Some(e),
            };
        }
        expected_sequence = record.sequence_no + 1;
        expected_prev = record.content_hash;
    }

    ChainVerification {
        valid: true,
        checked_count: checked,
        first_invalid_record_id: None,
        error_message: None,
    }
}

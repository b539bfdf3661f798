//! Response DTOs

use serde::Serialize;

use crate::api::handlers::helpers::{encode_payload, format_hash, format_timestamp};
use crate::ingest::IngestOutcome;
use crate::traits::{EventRecord, HaltedPartition};

/// A committed record as returned by the API
///
/// Hashes are lowercase hex, the payload is base64 and timestamps are
/// RFC 3339.
#[derive(Debug, Clone, Serialize)]
pub struct RecordDto {
    pub record_id: String,
    pub chain_key: String,
    pub sequence_no: u64,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_subtype: Option<String>,
    pub source: String,
    pub occurred_at: String,
    pub ingested_at: String,
    pub payload: String,
    pub content_hash: String,
    pub prev_hash: String,
    pub storage_tier: String,
    pub idempotency_key: String,
    pub partition: String,
}

impl From<&EventRecord> for RecordDto {
    fn from(r: &EventRecord) -> Self {
        Self {
            record_id: r.record_id.to_string(),
            chain_key: r.chain_key.clone(),
            sequence_no: r.sequence_no,
            event_type: r.event_type.clone(),
            event_subtype: r.event_subtype.clone(),
            source: r.source.clone(),
            occurred_at: format_timestamp(&r.occurred_at),
            ingested_at: format_timestamp(&r.ingested_at),
            payload: encode_payload(&r.payload),
            content_hash: format_hash(&r.content_hash),
            prev_hash: format_hash(&r.prev_hash),
            storage_tier: r.storage_tier.as_str().to_string(),
            idempotency_key: r.idempotency_key.clone(),
            partition: r.partition.to_string(),
        }
    }
}

/// Response body for POST /v1/events
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// The key was already committed and `record` is the original
    pub duplicate: bool,
    pub record: RecordDto,
}

impl From<&IngestOutcome> for IngestResponse {
    fn from(outcome: &IngestOutcome) -> Self {
        Self {
            duplicate: outcome.duplicate,
            record: RecordDto::from(&outcome.record),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,

    pub version: String,

    pub uptime_secs: u64,

    pub storage_healthy: bool,

    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HaltedPartitionDto {
    pub partition: String,
    pub reason: String,
    pub halted_at: String,
}

impl From<&HaltedPartition> for HaltedPartitionDto {
    fn from(h: &HaltedPartition) -> Self {
        Self {
            partition: h.partition.to_string(),
            reason: h.reason.clone(),
            halted_at: format_timestamp(&h.halted_at),
        }
    }
}

/// Response body for POST /v1/partitions/:domain/:date/resume
#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub partition: String,
    /// False when the partition was not halted
    pub resumed: bool,
}

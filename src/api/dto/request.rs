//! Request DTOs

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::ingest::CandidateEvent;
use crate::query::{ListRequest, TrailRequest, VerifyTarget};

/// Request body for POST /v1/events
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub idempotency_key: String,
    pub event_type: String,
    #[serde(default)]
    pub event_subtype: Option<String>,
    pub source: String,

    /// Explicit chain; defaults to `"{source}:{event_type}"`
    #[serde(default, alias = "user_id")]
    pub chain_key: Option<String>,

    /// Producer timestamp (RFC 3339); defaults to now
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,

    /// Opaque payload bytes, base64
    #[serde(default)]
    pub payload: Option<String>,

    /// Structured payload, stored as its serialized bytes
    #[serde(default)]
    pub payload_json: Option<serde_json::Value>,
}

impl IngestRequest {
    /// Convert to a candidate event; exactly one payload field must be set
    pub fn into_candidate(self) -> ServerResult<CandidateEvent> {
        let payload = match (self.payload, self.payload_json) {
            (Some(b64), None) => base64::engine::general_purpose::STANDARD.decode(b64)?,
            (None, Some(value)) => serde_json::to_vec(&value)?,
            (Some(_), Some(_)) => {
                return Err(ServerError::Validation(
                    "exactly one of payload or payload_json is allowed".into(),
                ))
            }
            (None, None) => {
                return Err(ServerError::Validation(
                    "payload or payload_json is required".into(),
                ))
            }
        };

        Ok(CandidateEvent {
            idempotency_key: self.idempotency_key,
            event_type: self.event_type,
            event_subtype: self.event_subtype,
            source: self.source,
            chain_key: self.chain_key,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload,
        })
    }
}

/// Query string for GET /v1/chains/:chain_key/trail
#[derive(Debug, Default, Deserialize)]
pub struct TrailParams {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub from_sequence: Option<u64>,
    pub to_sequence: Option<u64>,
    pub limit: Option<usize>,
}

impl TrailParams {
    pub fn into_request(self, chain_key: String) -> TrailRequest {
        TrailRequest {
            chain_key,
            since: self.since,
            until: self.until,
            event_type: self.event_type,
            from_sequence: self.from_sequence,
            to_sequence: self.to_sequence,
            limit: self.limit,
        }
    }
}

/// Query string for GET /v1/events
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub source: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
}

impl From<ListParams> for ListRequest {
    fn from(p: ListParams) -> Self {
        ListRequest {
            source: p.source,
            event_type: p.event_type,
            limit: p.limit,
        }
    }
}

/// Request body for POST /v1/verify
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub chain_key: Option<String>,
    #[serde(default)]
    pub record_ids: Option<Vec<Uuid>>,
}

impl VerifyRequest {
    pub fn into_target(self) -> ServerResult<VerifyTarget> {
        match (self.chain_key, self.record_ids) {
            (Some(key), None) => Ok(VerifyTarget::Chain(key)),
            (None, Some(ids)) => Ok(VerifyTarget::Records(ids)),
            _ => Err(ServerError::Validation(
                "exactly one of chain_key or record_ids is required".into(),
            )),
        }
    }
}

/// Request body for POST /v1/records/:record_id/tombstone
#[derive(Debug, Deserialize)]
pub struct TombstoneRequest {
    pub reason: String,
    pub requested_by: String,
}

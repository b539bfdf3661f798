//! Helper functions for formatting records in responses

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

/// Format hash as lowercase hex
pub fn format_hash(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

/// Encode payload bytes as standard base64
pub fn encode_payload(payload: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(payload)
}

/// Format timestamp as RFC 3339 with nanosecond precision
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

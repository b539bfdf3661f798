//! Inbound events and their validation

use chrono::{DateTime, Utc};

use super::IngestConfig;
use crate::error::{ServerError, ServerResult};

/// An event submitted for ingestion
///
/// Sequence numbers, hashes, `ingested_at` and the tier are never supplied by
/// the caller.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    pub idempotency_key: String,
    pub event_type: String,
    pub event_subtype: Option<String>,
    pub source: String,
    /// Explicit chain; defaults to `"{source}:{event_type}"`
    pub chain_key: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl CandidateEvent {
    /// Check field bounds; nothing is truncated
    pub fn validate(&self, config: &IngestConfig) -> ServerResult<()> {
        validate_field("idempotency_key", &self.idempotency_key, config.max_field_len)?;
        validate_field("event_type", &self.event_type, config.max_field_len)?;
        validate_field("source", &self.source, config.max_field_len)?;

        if let Some(subtype) = &self.event_subtype {
            if subtype.len() > config.max_field_len {
                return Err(ServerError::Validation(format!(
                    "event_subtype exceeds {} bytes",
                    config.max_field_len
                )));
            }
        }

        if let Some(chain_key) = &self.chain_key {
            validate_field("chain_key", chain_key, config.max_field_len)?;
            if chain_key.contains('/') {
                return Err(ServerError::Validation(
                    "chain_key must not contain '/'".into(),
                ));
            }
        }

        if self.payload.len() > config.max_payload_bytes {
            return Err(ServerError::PayloadTooLarge {
                size: self.payload.len(),
                max: config.max_payload_bytes,
            });
        }

        if self.occurred_at.timestamp_nanos_opt().is_none() {
            return Err(ServerError::Validation(
                "occurred_at is outside the representable range".into(),
            ));
        }

        Ok(())
    }

    /// Chain this event is appended to
    pub fn resolve_chain_key(&self) -> String {
        match &self.chain_key {
            Some(key) => key.clone(),
            None => format!("{}:{}", self.source, self.event_type),
        }
    }
}

fn validate_field(name: &str, value: &str, max_len: usize) -> ServerResult<()> {
    if value.trim().is_empty() {
        return Err(ServerError::Validation(format!("{} is required", name)));
    }
    if value.len() > max_len {
        return Err(ServerError::Validation(format!(
            "{} exceeds {} bytes",
            name, max_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> CandidateEvent {
        CandidateEvent {
            idempotency_key: "evt-1".into(),
            event_type: "login".into(),
            event_subtype: None,
            source: "identity-engine".into(),
            chain_key: None,
            occurred_at: Utc::now(),
            payload: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_valid_event_passes() {
        assert!(event().validate(&IngestConfig::default()).is_ok());
    }

    #[test]
    fn test_default_chain_key() {
        assert_eq!(event().resolve_chain_key(), "identity-engine:login");

        let explicit = CandidateEvent {
            chain_key: Some("user-42".into()),
            ..event()
        };
        assert_eq!(explicit.resolve_chain_key(), "user-42");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let config = IngestConfig::default();
        for broken in [
            CandidateEvent {
                idempotency_key: "".into(),
                ..event()
            },
            CandidateEvent {
                event_type: "  ".into(),
                ..event()
            },
            CandidateEvent {
                source: "".into(),
                ..event()
            },
        ] {
            assert!(matches!(
                broken.validate(&config),
                Err(ServerError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_long_field_rejected() {
        let config = IngestConfig::default();
        let e = CandidateEvent {
            event_type: "x".repeat(config.max_field_len + 1),
            ..event()
        };
        assert!(matches!(e.validate(&config), Err(ServerError::Validation(_))));
    }

    #[test]
    fn test_chain_key_with_slash_rejected() {
        let e = CandidateEvent {
            chain_key: Some("a/b".into()),
            ..event()
        };
        assert!(e.validate(&IngestConfig::default()).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected_not_truncated() {
        let config = IngestConfig {
            max_payload_bytes: 8,
            ..Default::default()
        };
        let e = CandidateEvent {
            payload: vec![0u8; 9],
            ..event()
        };
        match e.validate(&config) {
            Err(ServerError::PayloadTooLarge { size, max }) => {
                assert_eq!(size, 9);
                assert_eq!(max, 8);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_timestamp_rejected() {
        let e = CandidateEvent {
            occurred_at: Utc.with_ymd_and_hms(2500, 1, 1, 0, 0, 0).unwrap(),
            ..event()
        };
        assert!(e.validate(&IngestConfig::default()).is_err());
    }
}

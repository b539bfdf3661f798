//! Custom test assertions for record and chain JSON

use serde_json::Value;

/// Assert that a record JSON has the expected structure
pub fn assert_valid_record_structure(record: &Value) {
    assert!(record.is_object(), "Record should be a JSON object");

    for field in ["record_id", "chain_key", "event_type", "source", "idempotency_key"] {
        assert!(record[field].is_string(), "Record should have '{}' string", field);
    }
    assert!(record["sequence_no"].is_u64(), "Record should have 'sequence_no'");

    for field in ["content_hash", "prev_hash"] {
        let hash = record[field].as_str().unwrap_or_default();
        assert_eq!(hash.len(), 64, "{} should be 64 hex chars", field);
        assert!(
            hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "{} should be lowercase hex",
            field
        );
    }

    for field in ["occurred_at", "ingested_at"] {
        let ts = record[field].as_str().unwrap_or_default();
        assert!(
            chrono::DateTime::parse_from_rfc3339(ts).is_ok(),
            "{} should be RFC 3339, got '{}'",
            field,
            ts
        );
    }

    assert!(
        matches!(record["storage_tier"].as_str(), Some("hot" | "warm" | "cold")),
        "storage_tier should be hot, warm or cold"
    );
}

/// Assert that a trail is contiguous from `first_sequence` and hash-linked
pub fn assert_linked_trail(trail: &[Value], first_sequence: u64) {
    for (i, record) in trail.iter().enumerate() {
        assert_valid_record_structure(record);
        assert_eq!(
            record["sequence_no"].as_u64(),
            Some(first_sequence + i as u64),
            "sequence numbers should be contiguous"
        );
        if i > 0 {
            assert_eq!(
                record["prev_hash"], trail[i - 1]["content_hash"],
                "record {} should link to its predecessor",
                i
            );
        }
    }
}

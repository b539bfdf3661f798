//! Record builders shared by the SQLite store tests

use super::store::SqliteStore;
use crate::chain::{commit, ChainFields};
use crate::traits::{EventRecord, InsertOutcome, PartitionKey, StorageTier};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub(crate) fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Append a record ingested at `ingested_at` to `chain_key`
pub(crate) fn append_at(
    store: &SqliteStore,
    chain_key: &str,
    key: &str,
    payload: &[u8],
    ingested_at: DateTime<Utc>,
) -> EventRecord {
    let head = store.chain_head_impl(chain_key).unwrap();
    let c = commit(
        head.as_ref(),
        &ChainFields {
            chain_key,
            event_type: "login",
            source: "identity-engine",
            occurred_at: ingested_at,
            payload,
        },
    );
    let record = EventRecord {
        record_id: Uuid::new_v4(),
        chain_key: chain_key.to_string(),
        sequence_no: c.sequence_no,
        event_type: "login".into(),
        event_subtype: None,
        source: "identity-engine".into(),
        occurred_at: ingested_at,
        ingested_at,
        payload: payload.to_vec(),
        content_hash: c.content_hash,
        prev_hash: c.prev_hash,
        storage_tier: StorageTier::Hot,
        idempotency_key: key.to_string(),
        partition: PartitionKey::for_record(chain_key, ingested_at),
    };
    match store.insert_record_impl(&record).unwrap() {
        InsertOutcome::Inserted => record,
        InsertOutcome::Duplicate(_) => panic!("unexpected duplicate key {}", key),
    }
}

// File: src/storage/sqlite/convert.rs

use crate::chain::ChainHead;
use crate::traits::{EventRecord, PartitionKey, StorageTier, VerificationRun};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

/// Columns selected for every record read, in `row_to_stored` order
pub(super) const RECORD_COLUMNS: &str = "r.record_id, r.chain_key, r.sequence_no, r.event_type, \
     r.event_subtype, r.source, r.occurred_at, r.ingested_at, r.payload, r.payload_len, \
     s.path, r.segment_offset, r.content_hash, r.prev_hash, r.storage_tier, \
     r.idempotency_key, r.partition_domain, r.partition_date";

/// FROM clause matching [`RECORD_COLUMNS`]
pub(super) const RECORD_FROM: &str =
    "records r LEFT JOIN segments s ON s.segment_id = r.segment_id";

/// Where a record's authoritative payload copy lives
#[derive(Debug, Clone)]
pub(super) enum PayloadLocation {
    Inline(Vec<u8>),
    Segment { path: String, offset: u64, len: u32 },
    Missing,
}

/// A record row before its payload is resolved
#[derive(Debug, Clone)]
pub(super) struct StoredRecord {
    /// Record with an empty payload
    pub record: EventRecord,
    pub location: PayloadLocation,
}

pub(super) fn nanos_to_datetime(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

pub(super) fn datetime_to_nanos(at: &DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(0)
}

pub(super) fn blob_to_hash(bytes: Vec<u8>, idx: usize, name: &str) -> rusqlite::Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, name.into(), Type::Blob))
}

/// Convert a database row to a StoredRecord
pub(super) fn row_to_stored(row: &Row) -> rusqlite::Result<StoredRecord> {
    let record_id: String = row.get(0)?;
    let sequence_no: i64 = row.get(2)?;
    let occurred_at: i64 = row.get(6)?;
    let ingested_at: i64 = row.get(7)?;
    let inline: Option<Vec<u8>> = row.get(8)?;
    let payload_len: i64 = row.get(9)?;
    let segment_path: Option<String> = row.get(10)?;
    let segment_offset: Option<i64> = row.get(11)?;
    let tier: String = row.get(14)?;
    let partition_date: String = row.get(17)?;

    let location = match (inline, segment_path, segment_offset) {
        (Some(bytes), _, _) => PayloadLocation::Inline(bytes),
        (None, Some(path), Some(offset)) => PayloadLocation::Segment {
            path,
            offset: offset as u64,
            len: payload_len as u32,
        },
        _ => PayloadLocation::Missing,
    };

    let record = EventRecord {
        record_id: record_id
            .parse()
            .map_err(|_| rusqlite::Error::InvalidColumnType(0, "record_id".into(), Type::Text))?,
        chain_key: row.get(1)?,
        sequence_no: sequence_no as u64,
        event_type: row.get(3)?,
        event_subtype: row.get(4)?,
        source: row.get(5)?,
        occurred_at: nanos_to_datetime(occurred_at),
        ingested_at: nanos_to_datetime(ingested_at),
        payload: Vec::new(),
        content_hash: blob_to_hash(row.get(12)?, 12, "content_hash")?,
        prev_hash: blob_to_hash(row.get(13)?, 13, "prev_hash")?,
        storage_tier: StorageTier::parse(&tier)
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(14, "storage_tier".into(), Type::Text))?,
        idempotency_key: row.get(15)?,
        partition: PartitionKey {
            domain: row.get(16)?,
            date: NaiveDate::parse_from_str(&partition_date, "%Y-%m-%d").map_err(|_| {
                rusqlite::Error::InvalidColumnType(17, "partition_date".into(), Type::Text)
            })?,
        },
    };

    Ok(StoredRecord { record, location })
}

/// Convert a `chain_heads` row
pub(super) fn row_to_head(row: &Row) -> rusqlite::Result<ChainHead> {
    let sequence_no: i64 = row.get(0)?;
    Ok(ChainHead {
        sequence_no: sequence_no as u64,
        content_hash: blob_to_hash(row.get(1)?, 1, "last_hash")?,
    })
}

/// Convert a `verification_runs` row
pub(super) fn row_to_verification(row: &Row) -> rusqlite::Result<VerificationRun> {
    let valid: i64 = row.get(1)?;
    let checked: i64 = row.get(2)?;
    let first_invalid: Option<String> = row.get(3)?;
    let started_at: i64 = row.get(4)?;
    let finished_at: i64 = row.get(5)?;

    Ok(VerificationRun {
        target: row.get(0)?,
        valid: valid != 0,
        checked_count: checked as u64,
        first_invalid_record_id: first_invalid.and_then(|s| s.parse().ok()),
        started_at: nanos_to_datetime(started_at),
        finished_at: nanos_to_datetime(finished_at),
    })
}

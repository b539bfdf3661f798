// File: src/storage/sqlite/schema.rs

use crate::error::{ServerResult, StorageError};
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Create all tables (idempotent) and record the schema version
pub fn create_tables(conn: &Connection) -> ServerResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM ledger_config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(v) = stored {
        let version: u32 = v.parse().map_err(|_| {
            StorageError::Corruption(format!("invalid schema_version '{}'", v))
        })?;
        if version > SCHEMA_VERSION {
            return Err(StorageError::MigrationFailed(format!(
                "database schema v{} is newer than supported v{}",
                version, SCHEMA_VERSION
            ))
            .into());
        }
    }

    let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    conn.execute(
        "INSERT OR REPLACE INTO ledger_config (key, value, updated_at) VALUES ('schema_version', ?1, ?2)",
        rusqlite::params![SCHEMA_VERSION.to_string(), now],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Core configuration
CREATE TABLE IF NOT EXISTS ledger_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Committed records. Rows are never updated except for the tier
-- relocation columns (storage_tier, payload, segment_id, segment_offset).
CREATE TABLE IF NOT EXISTS records (
    record_id TEXT PRIMARY KEY,             -- UUID as text
    chain_key TEXT NOT NULL,
    sequence_no INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    event_subtype TEXT,
    source TEXT NOT NULL,
    occurred_at INTEGER NOT NULL,           -- Unix nanoseconds
    ingested_at INTEGER NOT NULL,           -- Unix nanoseconds
    payload BLOB,                           -- Hot copy (NULL once relocated)
    payload_len INTEGER NOT NULL,
    segment_id TEXT,                        -- Warm/cold copy (FK to segments)
    segment_offset INTEGER,                 -- Payload offset inside segment
    content_hash BLOB NOT NULL,             -- 32 bytes SHA-256
    prev_hash BLOB NOT NULL,                -- 32 bytes
    storage_tier TEXT NOT NULL DEFAULT 'hot',
    idempotency_key TEXT NOT NULL UNIQUE,
    partition_domain TEXT NOT NULL,
    partition_date TEXT NOT NULL,           -- YYYY-MM-DD of ingested_at
    UNIQUE (chain_key, sequence_no)
);

-- Durable chain heads (last committed sequence/hash per chain)
CREATE TABLE IF NOT EXISTS chain_heads (
    chain_key TEXT PRIMARY KEY,
    last_sequence_no INTEGER NOT NULL,
    last_hash BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Verification anchors for chains whose prefix expired
CREATE TABLE IF NOT EXISTS chain_retention (
    chain_key TEXT PRIMARY KEY,
    purged_through_seq INTEGER NOT NULL,
    purged_through_hash BLOB NOT NULL,
    purged_count INTEGER NOT NULL,
    purged_at INTEGER NOT NULL
);

-- Warm/cold segment files
CREATE TABLE IF NOT EXISTS segments (
    segment_id TEXT PRIMARY KEY,
    tier TEXT NOT NULL,
    path TEXT NOT NULL,                     -- Relative to data dir
    partition_domain TEXT NOT NULL,
    partition_date TEXT NOT NULL,
    source_tier TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'staged',   -- 'staged', 'live'
    created_at INTEGER NOT NULL
);

-- Frame index of each segment
CREATE TABLE IF NOT EXISTS segment_frames (
    segment_id TEXT NOT NULL,
    record_id TEXT NOT NULL,
    frame_offset INTEGER NOT NULL,
    payload_len INTEGER NOT NULL,
    PRIMARY KEY (segment_id, record_id)
);

-- Per-partition migration state
CREATE TABLE IF NOT EXISTS tier_partitions (
    partition_domain TEXT NOT NULL,
    partition_date TEXT NOT NULL,
    halted INTEGER NOT NULL DEFAULT 0,
    reason TEXT,
    halted_at INTEGER,
    PRIMARY KEY (partition_domain, partition_date)
);

-- Verification history
CREATE TABLE IF NOT EXISTS verification_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target TEXT NOT NULL,
    valid INTEGER NOT NULL,
    checked_count INTEGER NOT NULL,
    first_invalid_record_id TEXT,
    started_at INTEGER NOT NULL,
    finished_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_partition ON records(partition_domain, partition_date, storage_tier);
CREATE INDEX IF NOT EXISTS idx_records_tier_ingested ON records(storage_tier, ingested_at);
CREATE INDEX IF NOT EXISTS idx_records_ingested ON records(ingested_at);
CREATE INDEX IF NOT EXISTS idx_records_segment ON records(segment_id);
CREATE INDEX IF NOT EXISTS idx_segments_state ON segments(state);
"#;

// File: src/storage/sqlite/records.rs

use super::convert::{
    self, datetime_to_nanos, nanos_to_datetime, PayloadLocation, StoredRecord, RECORD_COLUMNS,
    RECORD_FROM,
};
use super::store::SqliteStore;
use crate::chain::{ChainAnchor, ChainHead, GENESIS_HASH};
use crate::error::{ServerError, ServerResult, StorageError};
use crate::traits::{
    CheckedRecord, EventRecord, InsertOutcome, ListFilter, StorageTier, StoreStats, TierStats,
    TrailQuery, VerificationRun,
};
use rusqlite::{params, Connection, OptionalExtension, Params, TransactionBehavior};
use uuid::Uuid;

impl SqliteStore {
    /// Atomically append a record after re-checking the durable chain head
    pub(crate) fn insert_record_impl(&self, record: &EventRecord) -> ServerResult<InsertOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = query_stored(
            &tx,
            "r.idempotency_key = ?1",
            params![record.idempotency_key],
        )?;
        if let Some(stored) = existing.into_iter().next() {
            drop(tx);
            drop(conn);
            return Ok(InsertOutcome::Duplicate(Box::new(self.materialize(stored)?)));
        }

        let head = read_head(&tx, &record.chain_key)?;
        let (expected_seq, expected_prev) = match head {
            Some(h) => (h.sequence_no + 1, h.content_hash),
            None => (0, GENESIS_HASH),
        };
        if record.sequence_no != expected_seq || record.prev_hash != expected_prev {
            return Err(StorageError::ChainConflict {
                chain_key: record.chain_key.clone(),
                expected: expected_seq,
                found: record.sequence_no,
            }
            .into());
        }

        tx.execute(
            "INSERT INTO records (record_id, chain_key, sequence_no, event_type, event_subtype, source,
                                  occurred_at, ingested_at, payload, payload_len, content_hash, prev_hash,
                                  storage_tier, idempotency_key, partition_domain, partition_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.record_id.to_string(),
                record.chain_key,
                record.sequence_no as i64,
                record.event_type,
                record.event_subtype,
                record.source,
                datetime_to_nanos(&record.occurred_at),
                datetime_to_nanos(&record.ingested_at),
                record.payload.as_slice(),
                record.payload.len() as i64,
                record.content_hash.as_slice(),
                record.prev_hash.as_slice(),
                StorageTier::Hot.as_str(),
                record.idempotency_key,
                record.partition.domain,
                record.partition.date_str(),
            ],
        )?;

        tx.execute(
            "INSERT INTO chain_heads (chain_key, last_sequence_no, last_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chain_key) DO UPDATE SET
                 last_sequence_no = excluded.last_sequence_no,
                 last_hash = excluded.last_hash,
                 updated_at = excluded.updated_at",
            params![
                record.chain_key,
                record.sequence_no as i64,
                record.content_hash.as_slice(),
                datetime_to_nanos(&record.ingested_at),
            ],
        )?;

        tx.commit()?;
        Ok(InsertOutcome::Inserted)
    }

    pub(crate) fn chain_head_impl(&self, chain_key: &str) -> ServerResult<Option<ChainHead>> {
        let conn = self.read_conn()?;
        read_head(&conn, chain_key)
    }

    pub(crate) fn find_by_idempotency_key_impl(&self, key: &str) -> ServerResult<Option<EventRecord>> {
        let rows = {
            let conn = self.read_conn()?;
            query_stored(&conn, "r.idempotency_key = ?1", params![key])?
        };
        rows.into_iter().next().map(|s| self.materialize(s)).transpose()
    }

    pub(crate) fn get_record_impl(&self, record_id: &Uuid) -> ServerResult<EventRecord> {
        let rows = {
            let conn = self.read_conn()?;
            query_stored(&conn, "r.record_id = ?1", params![record_id.to_string()])?
        };
        match rows.into_iter().next() {
            Some(stored) => self.materialize(stored),
            None => Err(ServerError::RecordNotFound(record_id.to_string())),
        }
    }

    pub(crate) fn trail_page_impl(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<EventRecord>> {
        let rows = self.trail_rows(query, after_sequence, limit)?;
        self.materialize_all(rows)
    }

    pub(crate) fn verify_page_impl(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<CheckedRecord>> {
        self.trail_rows(query, after_sequence, limit)?
            .into_iter()
            .map(|stored| self.materialize_checked(stored))
            .collect()
    }

    pub(crate) fn checked_record_impl(&self, record_id: &Uuid) -> ServerResult<CheckedRecord> {
        let rows = {
            let conn = self.read_conn()?;
            query_stored(&conn, "r.record_id = ?1", params![record_id.to_string()])?
        };
        match rows.into_iter().next() {
            Some(stored) => self.materialize_checked(stored),
            None => Err(ServerError::RecordNotFound(record_id.to_string())),
        }
    }

    pub(crate) fn content_hash_at_impl(
        &self,
        chain_key: &str,
        sequence_no: u64,
    ) -> ServerResult<Option<[u8; 32]>> {
        let conn = self.read_conn()?;
        let hash = conn
            .query_row(
                "SELECT content_hash FROM records WHERE chain_key = ?1 AND sequence_no = ?2",
                params![chain_key, sequence_no as i64],
                |row| convert::blob_to_hash(row.get(0)?, 0, "content_hash"),
            )
            .optional()?;
        Ok(hash)
    }

    fn trail_rows(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<StoredRecord>> {
        let conn = self.read_conn()?;
        let rows = query_stored(
            &conn,
            "r.chain_key = ?1
             AND (?2 IS NULL OR r.sequence_no > ?2)
             AND (?3 IS NULL OR r.ingested_at >= ?3)
             AND (?4 IS NULL OR r.ingested_at < ?4)
             AND (?5 IS NULL OR r.event_type = ?5)
             AND (?6 IS NULL OR r.sequence_no >= ?6)
             AND (?7 IS NULL OR r.sequence_no <= ?7)
             ORDER BY r.sequence_no ASC
             LIMIT ?8",
            params![
                query.chain_key,
                after_sequence.map(|s| s as i64),
                query.since.as_ref().map(datetime_to_nanos),
                query.until.as_ref().map(datetime_to_nanos),
                query.event_type,
                query.from_sequence.map(|s| s as i64),
                query.to_sequence.map(|s| s as i64),
                limit as i64,
            ],
        )?;
        Ok(rows)
    }

    pub(crate) fn chain_anchor_impl(&self, chain_key: &str) -> ServerResult<ChainAnchor> {
        let conn = self.read_conn()?;
        read_anchor(&conn, chain_key)
    }

    pub(crate) fn list_recent_impl(&self, filter: &ListFilter) -> ServerResult<Vec<EventRecord>> {
        let rows = {
            let conn = self.read_conn()?;
            query_stored(
                &conn,
                "(?1 IS NULL OR r.source = ?1)
                 AND (?2 IS NULL OR r.event_type = ?2)
                 ORDER BY r.ingested_at DESC, r.sequence_no DESC
                 LIMIT ?3",
                params![filter.source, filter.event_type, filter.limit as i64],
            )?
        };
        self.materialize_all(rows)
    }

    pub(crate) fn record_verification_impl(&self, run: &VerificationRun) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO verification_runs (target, valid, checked_count, first_invalid_record_id, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.target,
                run.valid as i64,
                run.checked_count as i64,
                run.first_invalid_record_id.map(|id| id.to_string()),
                datetime_to_nanos(&run.started_at),
                datetime_to_nanos(&run.finished_at),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn stats_impl(&self) -> ServerResult<StoreStats> {
        let halted = self
            .halted_partitions_impl()?
            .into_iter()
            .map(|h| h.partition.to_string())
            .collect();

        let conn = self.read_conn()?;

        let mut tiers: Vec<TierStats> = StorageTier::ALL
            .iter()
            .map(|tier| TierStats {
                tier: *tier,
                record_count: 0,
                oldest_ingested_at: None,
                newest_ingested_at: None,
            })
            .collect();

        let mut stmt = conn.prepare_cached(
            "SELECT storage_tier, COUNT(*), MIN(ingested_at), MAX(ingested_at)
             FROM records GROUP BY storage_tier",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;
        for row in rows {
            let (tier, count, oldest, newest) = row?;
            let Some(tier) = StorageTier::parse(&tier) else {
                return Err(StorageError::Corruption(format!("unknown tier '{}'", tier)).into());
            };
            if let Some(entry) = tiers.iter_mut().find(|t| t.tier == tier) {
                entry.record_count = count as u64;
                entry.oldest_ingested_at = oldest.map(nanos_to_datetime);
                entry.newest_ingested_at = newest.map(nanos_to_datetime);
            }
        }
        drop(stmt);

        let chain_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chain_heads", [], |row| row.get(0))?;

        let last_verification = conn
            .query_row(
                "SELECT target, valid, checked_count, first_invalid_record_id, started_at, finished_at
                 FROM verification_runs ORDER BY id DESC LIMIT 1",
                [],
                convert::row_to_verification,
            )
            .optional()?;

        let total_records = tiers.iter().map(|t| t.record_count).sum();
        let oldest_ingested_at = tiers.iter().filter_map(|t| t.oldest_ingested_at).min();
        let newest_ingested_at = tiers.iter().filter_map(|t| t.newest_ingested_at).max();

        Ok(StoreStats {
            tiers,
            total_records,
            chain_count: chain_count as u64,
            oldest_ingested_at,
            newest_ingested_at,
            halted_partitions: halted,
            last_verification,
        })
    }

    /// Resolve the payload of a stored row from its current tier
    ///
    /// A concurrent relabel may delete the segment between the row read and
    /// the file read; the location is then re-read once.
    pub(super) fn materialize(&self, stored: StoredRecord) -> ServerResult<EventRecord> {
        let StoredRecord {
            mut record,
            location,
        } = stored;

        match self.read_location(&record, location) {
            Ok(payload) => {
                record.payload = payload;
                Ok(record)
            }
            Err(ServerError::Storage(StorageError::Io(e)))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                let fresh = {
                    let conn = self.read_conn()?;
                    query_stored(
                        &conn,
                        "r.record_id = ?1",
                        params![record.record_id.to_string()],
                    )?
                };
                let Some(stored) = fresh.into_iter().next() else {
                    return Err(ServerError::RecordNotFound(record.record_id.to_string()));
                };
                let mut fresh_record = stored.record;
                fresh_record.payload = self.read_location(&fresh_record, stored.location)?;
                Ok(fresh_record)
            }
            Err(e) => Err(e),
        }
    }

    fn read_location(&self, record: &EventRecord, location: PayloadLocation) -> ServerResult<Vec<u8>> {
        match location {
            PayloadLocation::Inline(bytes) => Ok(bytes),
            PayloadLocation::Segment { path, offset, len } => {
                Ok(self.segments().read_payload(&path, offset, len)?)
            }
            PayloadLocation::Missing => Err(StorageError::Corruption(format!(
                "record {} has no payload copy in tier {}",
                record.record_id, record.storage_tier
            ))
            .into()),
        }
    }

    /// Resolve a payload, reporting a lost or damaged copy on the record
    pub(super) fn materialize_checked(&self, stored: StoredRecord) -> ServerResult<CheckedRecord> {
        let bare = stored.record.clone();
        match self.materialize(stored) {
            Ok(record) => Ok(CheckedRecord {
                record,
                payload_fault: None,
            }),
            Err(ServerError::Storage(e)) if e.is_payload_fault() => Ok(CheckedRecord {
                record: bare,
                payload_fault: Some(e.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    pub(super) fn materialize_all(&self, rows: Vec<StoredRecord>) -> ServerResult<Vec<EventRecord>> {
        rows.into_iter().map(|s| self.materialize(s)).collect()
    }
}

/// Select records matching a WHERE clause (which may carry ORDER BY/LIMIT)
pub(super) fn query_stored<P: Params>(
    conn: &Connection,
    where_sql: &str,
    params: P,
) -> ServerResult<Vec<StoredRecord>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        RECORD_COLUMNS, RECORD_FROM, where_sql
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params, convert::row_to_stored)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn read_head(conn: &Connection, chain_key: &str) -> ServerResult<Option<ChainHead>> {
    let head = conn
        .query_row(
            "SELECT last_sequence_no, last_hash FROM chain_heads WHERE chain_key = ?1",
            params![chain_key],
            convert::row_to_head,
        )
        .optional()?;
    Ok(head)
}

pub(super) fn read_anchor(conn: &Connection, chain_key: &str) -> ServerResult<ChainAnchor> {
    let purged = conn
        .query_row(
            "SELECT purged_through_seq, purged_through_hash FROM chain_retention WHERE chain_key = ?1",
            params![chain_key],
            convert::row_to_head,
        )
        .optional()?;
    Ok(purged
        .map(|head| ChainAnchor::after(&head))
        .unwrap_or(ChainAnchor::GENESIS))
}

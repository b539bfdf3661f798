// File: src/storage/sqlite/tiers.rs

use super::convert::{blob_to_hash, datetime_to_nanos, nanos_to_datetime};
use super::records::{query_stored, read_anchor};
use super::store::SqliteStore;
use crate::chain::{verify_link, ChainVerification};
use crate::error::{ServerError, ServerResult, StorageError};
use crate::storage::segment::{FrameLocation, SegmentStore};
use crate::traits::{
    EventRecord, ExpiryPlan, HaltedPartition, PartitionKey, StagedCopy, StorageTier, RETENTION_CHAIN_KEY,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const SEGMENT_STAGED: &str = "staged";
const SEGMENT_LIVE: &str = "live";

/// Records read per round trip while re-verifying a chain
const VERIFY_PAGE: usize = 1000;

/// Segment row needed to rewrite or drop a segment
struct SegmentMeta {
    path: String,
    tier: StorageTier,
    source_tier: StorageTier,
    partition: PartitionKey,
}

fn parse_partition(domain: String, date: &str) -> ServerResult<PartitionKey> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| StorageError::Corruption(format!("invalid partition date '{}'", date)))?;
    Ok(PartitionKey { domain, date })
}

fn parse_tier(s: &str) -> ServerResult<StorageTier> {
    StorageTier::parse(s)
        .ok_or_else(|| StorageError::Corruption(format!("unknown tier '{}'", s)).into())
}

fn invalid(checked: u64, record_id: Option<Uuid>, message: String) -> ChainVerification {
    ChainVerification {
        valid: false,
        checked_count: checked,
        first_invalid_record_id: record_id,
        error_message: Some(message),
    }
}

impl SqliteStore {
    pub(crate) fn migration_partitions_impl(
        &self,
        from: StorageTier,
        cutoff: DateTime<Utc>,
    ) -> ServerResult<Vec<PartitionKey>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT r.partition_domain, r.partition_date
             FROM records r
             LEFT JOIN tier_partitions t
                    ON t.partition_domain = r.partition_domain
                   AND t.partition_date = r.partition_date
             WHERE r.storage_tier = ?1 AND r.ingested_at < ?2 AND COALESCE(t.halted, 0) = 0
             ORDER BY r.partition_date, r.partition_domain",
        )?;
        let rows = stmt
            .query_map(params![from.as_str(), datetime_to_nanos(&cutoff)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(domain, date)| parse_partition(domain, &date))
            .collect()
    }

    pub(crate) fn migration_batch_impl(
        &self,
        partition: &PartitionKey,
        from: StorageTier,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> ServerResult<Vec<EventRecord>> {
        let rows = {
            let conn = self.read_conn()?;
            query_stored(
                &conn,
                "r.partition_domain = ?1 AND r.partition_date = ?2
                 AND r.storage_tier = ?3 AND r.ingested_at < ?4
                 ORDER BY r.chain_key, r.sequence_no
                 LIMIT ?5",
                params![
                    partition.domain,
                    partition.date_str(),
                    from.as_str(),
                    datetime_to_nanos(&cutoff),
                    limit as i64,
                ],
            )?
        };
        self.materialize_all(rows)
    }

    pub(crate) fn copy_to_tier_impl(
        &self,
        partition: &PartitionKey,
        to: StorageTier,
        records: &[EventRecord],
    ) -> ServerResult<StagedCopy> {
        let Some(first) = records.first() else {
            return Err(ServerError::InvalidArgument("no records to copy".into()));
        };
        let from = first.storage_tier;
        if to <= from {
            return Err(ServerError::InvalidArgument(format!(
                "cannot move records from {} to {}",
                from, to
            )));
        }
        if records
            .iter()
            .any(|r| r.storage_tier != from || &r.partition != partition)
        {
            return Err(ServerError::InvalidArgument(
                "copy batch spans several tiers or partitions".into(),
            ));
        }

        if self.is_halted(partition)? {
            return Err(ServerError::PartitionHalted(partition.to_string()));
        }

        let segment_id = Uuid::new_v4();
        let rel_path = SegmentStore::relative_path(to, partition, segment_id);

        // Tracked before the file exists so an interrupted copy is cleaned up
        self.insert_staged_segment(segment_id, to, &rel_path, partition, from, records.len())?;

        let frames: Vec<(Uuid, &[u8])> = records
            .iter()
            .map(|r| (r.record_id, r.payload.as_slice()))
            .collect();
        let written = self.segments().write(to, partition, segment_id, &frames)?;
        self.insert_frames(segment_id, &written.locations)?;

        Ok(StagedCopy {
            segment_id,
            partition: partition.clone(),
            from,
            to,
            record_ids: records.iter().map(|r| r.record_id).collect(),
        })
    }

    pub(crate) fn verify_staged_impl(&self, staged: &StagedCopy) -> ServerResult<ChainVerification> {
        let seg = staged.segment_id.to_string();
        let path: Option<String> = {
            let conn = self.read_conn()?;
            conn.query_row(
                "SELECT path FROM segments WHERE segment_id = ?1 AND state = ?2",
                params![seg, SEGMENT_STAGED],
                |row| row.get(0),
            )
            .optional()?
        };
        let Some(path) = path else {
            return Ok(invalid(0, None, format!("staged segment {} is not tracked", seg)));
        };

        let decoded = match self.segments().read_all(&path) {
            Ok(decoded) => decoded,
            Err(e) => {
                return Ok(invalid(0, None, format!("staged segment {} unreadable: {}", seg, e)))
            }
        };
        if decoded.segment_id != staged.segment_id || decoded.tier != staged.to {
            return Ok(invalid(
                0,
                None,
                format!("staged segment {} header does not match its row", seg),
            ));
        }

        let copies: HashMap<Uuid, Vec<u8>> = decoded.frames.into_iter().collect();
        if let Some(missing) = staged.record_ids.iter().find(|id| !copies.contains_key(id)) {
            return Ok(invalid(
                0,
                Some(*missing),
                format!("record {} missing from staged segment {}", missing, seg),
            ));
        }

        let chains: Vec<(String, i64)> = {
            let conn = self.read_conn()?;
            let mut stmt = conn.prepare_cached(
                "SELECT r.chain_key, MAX(r.sequence_no)
                 FROM segment_frames f JOIN records r ON r.record_id = f.record_id
                 WHERE f.segment_id = ?1
                 GROUP BY r.chain_key ORDER BY r.chain_key",
            )?;
            let rows = stmt
                .query_map(params![seg], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut checked = 0u64;
        for (chain_key, through) in chains {
            let result = self.verify_chain_through(&chain_key, through as u64, &copies)?;
            checked += result.checked_count;
            if !result.valid {
                return Ok(ChainVerification {
                    checked_count: checked,
                    ..result
                });
            }
        }

        Ok(ChainVerification {
            valid: true,
            checked_count: checked,
            first_invalid_record_id: None,
            error_message: None,
        })
    }

    /// Walk a chain from its anchor through `through`, taking payloads of
    /// records in `copies` from there instead of their current tier
    fn verify_chain_through(
        &self,
        chain_key: &str,
        through: u64,
        copies: &HashMap<Uuid, Vec<u8>>,
    ) -> ServerResult<ChainVerification> {
        let anchor = {
            let conn = self.read_conn()?;
            read_anchor(&conn, chain_key)?
        };
        let mut expected_sequence = anchor.next_sequence;
        let mut expected_prev = anchor.prev_hash;
        let mut checked = 0u64;
        let mut after: Option<u64> = None;

        loop {
            let rows = {
                let conn = self.read_conn()?;
                query_stored(
                    &conn,
                    "r.chain_key = ?1
                     AND (?2 IS NULL OR r.sequence_no > ?2)
                     AND r.sequence_no <= ?3
                     ORDER BY r.sequence_no ASC
                     LIMIT ?4",
                    params![
                        chain_key,
                        after.map(|s| s as i64),
                        through as i64,
                        VERIFY_PAGE as i64
                    ],
                )?
            };
            let page_len = rows.len();

            for stored in rows {
                let record_id = stored.record.record_id;
                checked += 1;

                let record = match copies.get(&record_id) {
                    Some(copy) => {
                        let mut record = stored.record;
                        record.payload = copy.clone();
                        record
                    }
                    None => match self.materialize(stored) {
                        Ok(record) => record,
                        Err(ServerError::Storage(e)) if e.is_payload_fault() => {
                            return Ok(invalid(
                                checked,
                                Some(record_id),
                                format!("payload copy unreadable: {}", e),
                            ));
                        }
                        Err(e) => return Err(e),
                    },
                };

                if let Err(e) = verify_link(&record, expected_sequence, &expected_prev) {
                    return Ok(invalid(
                        checked,
                        Some(record_id),
                        format!("chain {}: {}", chain_key, e),
                    ));
                }
                expected_sequence = record.sequence_no + 1;
                expected_prev = record.content_hash;
                after = Some(record.sequence_no);
            }

            if page_len < VERIFY_PAGE {
                break;
            }
        }

        Ok(ChainVerification {
            valid: true,
            checked_count: checked,
            first_invalid_record_id: None,
            error_message: None,
        })
    }

    pub(crate) fn relabel_impl(&self, staged: &StagedCopy) -> ServerResult<u64> {
        let seg = staged.segment_id.to_string();

        let (moved, candidates) = {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let state: Option<String> = tx
                .query_row(
                    "SELECT state FROM segments WHERE segment_id = ?1",
                    params![seg],
                    |row| row.get(0),
                )
                .optional()?;
            match state.as_deref() {
                Some(SEGMENT_STAGED) => {}
                Some(_) => return Ok(0),
                None => return Err(StorageError::NotFound(format!("segment {}", seg)).into()),
            }

            let mut previous: Vec<String> = {
                let mut stmt = tx.prepare_cached(
                    "SELECT DISTINCT r.segment_id
                     FROM records r JOIN segment_frames f ON f.record_id = r.record_id
                     WHERE f.segment_id = ?1 AND r.storage_tier = ?2 AND r.segment_id IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map(params![seg, staged.from.as_str()], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let moved = tx.execute(
                "UPDATE records
                 SET storage_tier = ?2,
                     payload = NULL,
                     segment_id = ?1,
                     segment_offset = (SELECT f.frame_offset FROM segment_frames f
                                       WHERE f.segment_id = ?1 AND f.record_id = records.record_id)
                 WHERE storage_tier = ?3
                   AND record_id IN (SELECT record_id FROM segment_frames WHERE segment_id = ?1)",
                params![seg, staged.to.as_str(), staged.from.as_str()],
            )?;
            tx.execute(
                "UPDATE segments SET state = ?2 WHERE segment_id = ?1",
                params![seg, SEGMENT_LIVE],
            )?;
            tx.commit()?;

            previous.push(seg);
            (moved as u64, previous)
        };

        for segment_id in &candidates {
            self.drop_if_unreferenced(segment_id)?;
        }

        tracing::debug!(
            segment_id = %staged.segment_id,
            partition = %staged.partition,
            from = %staged.from,
            to = %staged.to,
            moved,
            "Staged copy relabelled"
        );
        Ok(moved)
    }

    pub(crate) fn discard_staged_impl(&self, staged: &StagedCopy) -> ServerResult<()> {
        let seg = staged.segment_id.to_string();
        let path: Option<String> = {
            let conn = self.read_conn()?;
            conn.query_row(
                "SELECT path FROM segments WHERE segment_id = ?1 AND state = ?2",
                params![seg, SEGMENT_STAGED],
                |row| row.get(0),
            )
            .optional()?
        };
        match path {
            Some(path) => self.drop_segment(&seg, &path),
            None => Ok(()),
        }
    }

    /// Drop staged segments and live segments no record points to any more
    pub(crate) fn cleanup_staged_impl(&self) -> ServerResult<u64> {
        let orphans: Vec<(String, String)> = {
            let conn = self.read_conn()?;
            let mut stmt = conn.prepare_cached(
                "SELECT s.segment_id, s.path FROM segments s
                 WHERE NOT EXISTS (SELECT 1 FROM records r WHERE r.segment_id = s.segment_id)",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for (segment_id, path) in &orphans {
            self.drop_segment(segment_id, path)?;
        }
        if !orphans.is_empty() {
            tracing::info!(count = orphans.len(), "Removed orphaned segments");
        }
        Ok(orphans.len() as u64)
    }

    pub(crate) fn halt_partition_impl(&self, partition: &PartitionKey, reason: &str) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tier_partitions (partition_domain, partition_date, halted, reason, halted_at)
             VALUES (?1, ?2, 1, ?3, ?4)
             ON CONFLICT(partition_domain, partition_date) DO UPDATE SET
                 halted = 1,
                 reason = excluded.reason,
                 halted_at = excluded.halted_at",
            params![
                partition.domain,
                partition.date_str(),
                reason,
                datetime_to_nanos(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn resume_partition_impl(&self, partition: &PartitionKey) -> ServerResult<bool> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE tier_partitions SET halted = 0, reason = NULL, halted_at = NULL
             WHERE partition_domain = ?1 AND partition_date = ?2 AND halted = 1",
            params![partition.domain, partition.date_str()],
        )?;
        Ok(updated > 0)
    }

    fn is_halted(&self, partition: &PartitionKey) -> ServerResult<bool> {
        let conn = self.read_conn()?;
        let halted: Option<i64> = conn
            .query_row(
                "SELECT halted FROM tier_partitions
                 WHERE partition_domain = ?1 AND partition_date = ?2",
                params![partition.domain, partition.date_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(halted.unwrap_or(0) != 0)
    }

    pub(crate) fn halted_partitions_impl(&self) -> ServerResult<Vec<HaltedPartition>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT partition_domain, partition_date, reason, halted_at FROM tier_partitions
             WHERE halted = 1 ORDER BY partition_date, partition_domain",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(domain, date, reason, halted_at)| {
                Ok(HaltedPartition {
                    partition: parse_partition(domain, &date)?,
                    reason: reason.unwrap_or_default(),
                    halted_at: nanos_to_datetime(halted_at.unwrap_or(0)),
                })
            })
            .collect()
    }

    pub(crate) fn expiry_plans_impl(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> ServerResult<Vec<ExpiryPlan>> {
        let conn = self.read_conn()?;

        // Per chain: first and last sequence, plus the first record that
        // must be kept (not cold, or ingested after the cutoff)
        let candidates: Vec<(String, i64, i64, Option<i64>)> = {
            let mut stmt = conn.prepare_cached(
                "SELECT r.chain_key, MIN(r.sequence_no), MAX(r.sequence_no),
                        (SELECT MIN(b.sequence_no) FROM records b
                         WHERE b.chain_key = r.chain_key
                           AND (b.storage_tier != ?1 OR b.ingested_at >= ?2))
                 FROM records r
                 WHERE r.chain_key != ?3
                 GROUP BY r.chain_key
                 ORDER BY r.chain_key",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        StorageTier::Cold.as_str(),
                        datetime_to_nanos(&cutoff),
                        RETENTION_CHAIN_KEY
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut plans = Vec::new();
        for (chain_key, first, last, keep_from) in candidates {
            if plans.len() >= limit {
                break;
            }
            let through = match keep_from {
                None => last,
                Some(keep) if keep > first => keep - 1,
                Some(_) => continue,
            };

            let (hash, count): (Vec<u8>, i64) = conn.query_row(
                "SELECT (SELECT content_hash FROM records WHERE chain_key = ?1 AND sequence_no = ?2),
                        (SELECT COUNT(*) FROM records WHERE chain_key = ?1 AND sequence_no <= ?2)",
                params![chain_key, through],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            plans.push(ExpiryPlan {
                chain_key,
                from_sequence: first as u64,
                through_sequence: through as u64,
                through_hash: blob_to_hash(hash, 0, "content_hash")?,
                record_count: count as u64,
            });
        }
        Ok(plans)
    }

    pub(crate) fn expire_impl(&self, plan: &ExpiryPlan) -> ServerResult<u64> {
        if plan.chain_key == RETENTION_CHAIN_KEY {
            return Err(ServerError::InvalidArgument(
                "the retention chain is never expired".into(),
            ));
        }

        let (removed, touched) = {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let anchor = read_anchor(&tx, &plan.chain_key)?;
            if anchor.next_sequence > plan.through_sequence {
                return Ok(0);
            }

            let through_hash: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT content_hash FROM records
                     WHERE chain_key = ?1 AND sequence_no = ?2 AND storage_tier = ?3",
                    params![
                        plan.chain_key,
                        plan.through_sequence as i64,
                        StorageTier::Cold.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            let not_cold: i64 = tx.query_row(
                "SELECT COUNT(*) FROM records
                 WHERE chain_key = ?1 AND sequence_no <= ?2 AND storage_tier != ?3",
                params![
                    plan.chain_key,
                    plan.through_sequence as i64,
                    StorageTier::Cold.as_str()
                ],
                |row| row.get(0),
            )?;
            if through_hash.as_deref() != Some(plan.through_hash.as_slice()) || not_cold > 0 {
                tracing::warn!(
                    chain_key = %plan.chain_key,
                    through = plan.through_sequence,
                    "Expiry plan no longer matches stored chain, skipping"
                );
                return Ok(0);
            }

            let touched: Vec<String> = {
                let mut stmt = tx.prepare_cached(
                    "SELECT DISTINCT segment_id FROM records
                     WHERE chain_key = ?1 AND sequence_no <= ?2 AND segment_id IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map(
                        params![plan.chain_key, plan.through_sequence as i64],
                        |row| row.get(0),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            tx.execute(
                "DELETE FROM segment_frames WHERE record_id IN
                     (SELECT record_id FROM records WHERE chain_key = ?1 AND sequence_no <= ?2)",
                params![plan.chain_key, plan.through_sequence as i64],
            )?;
            let removed = tx.execute(
                "DELETE FROM records WHERE chain_key = ?1 AND sequence_no <= ?2",
                params![plan.chain_key, plan.through_sequence as i64],
            )?;
            tx.execute(
                "INSERT INTO chain_retention (chain_key, purged_through_seq, purged_through_hash, purged_count, purged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chain_key) DO UPDATE SET
                     purged_through_seq = excluded.purged_through_seq,
                     purged_through_hash = excluded.purged_through_hash,
                     purged_count = chain_retention.purged_count + excluded.purged_count,
                     purged_at = excluded.purged_at",
                params![
                    plan.chain_key,
                    plan.through_sequence as i64,
                    plan.through_hash.as_slice(),
                    removed as i64,
                    datetime_to_nanos(&Utc::now()),
                ],
            )?;
            tx.commit()?;
            (removed as u64, touched)
        };

        // Expired payload bytes must not survive in shared segments
        for segment_id in &touched {
            self.compact_segment(segment_id)?;
        }

        tracing::info!(
            chain_key = %plan.chain_key,
            through = plan.through_sequence,
            removed,
            "Chain prefix expired"
        );
        Ok(removed)
    }

    /// Rewrite a live segment keeping only frames still referenced
    fn compact_segment(&self, segment_id: &str) -> ServerResult<()> {
        let Some(meta) = self.segment_meta(segment_id)? else {
            return Ok(());
        };
        let remaining: HashSet<Uuid> = {
            let conn = self.read_conn()?;
            let mut stmt =
                conn.prepare_cached("SELECT record_id FROM records WHERE segment_id = ?1")?;
            let ids = stmt
                .query_map(params![segment_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids.iter().filter_map(|s| s.parse().ok()).collect()
        };
        if remaining.is_empty() {
            return self.drop_segment(segment_id, &meta.path);
        }

        let decoded = self.segments().read_all(&meta.path)?;
        let total = decoded.frames.len();
        let kept: Vec<(Uuid, Vec<u8>)> = decoded
            .frames
            .into_iter()
            .filter(|(id, _)| remaining.contains(id))
            .collect();
        if kept.len() != remaining.len() {
            return Err(StorageError::Corruption(format!(
                "segment {} holds {} of {} referenced frames",
                segment_id,
                kept.len(),
                remaining.len()
            ))
            .into());
        }
        if kept.len() == total {
            return Ok(());
        }

        let new_id = Uuid::new_v4();
        let rel_path = SegmentStore::relative_path(meta.tier, &meta.partition, new_id);
        self.insert_staged_segment(
            new_id,
            meta.tier,
            &rel_path,
            &meta.partition,
            meta.source_tier,
            kept.len(),
        )?;
        let frames: Vec<(Uuid, &[u8])> = kept.iter().map(|(id, p)| (*id, p.as_slice())).collect();
        let written = self
            .segments()
            .write(meta.tier, &meta.partition, new_id, &frames)?;
        self.insert_frames(new_id, &written.locations)?;

        {
            let mut conn = self.get_conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE records SET segment_id = ?1, segment_offset = ?2
                     WHERE record_id = ?3 AND segment_id = ?4",
                )?;
                for loc in &written.locations {
                    stmt.execute(params![
                        new_id.to_string(),
                        loc.offset as i64,
                        loc.record_id.to_string(),
                        segment_id,
                    ])?;
                }
            }
            tx.execute(
                "UPDATE segments SET state = ?2 WHERE segment_id = ?1",
                params![new_id.to_string(), SEGMENT_LIVE],
            )?;
            tx.commit()?;
        }

        self.drop_segment(segment_id, &meta.path)?;
        tracing::debug!(
            old_segment = %segment_id,
            new_segment = %new_id,
            kept = kept.len(),
            dropped = total - kept.len(),
            "Segment compacted"
        );
        Ok(())
    }

    fn segment_meta(&self, segment_id: &str) -> ServerResult<Option<SegmentMeta>> {
        let row: Option<(String, String, String, String, String)> = {
            let conn = self.read_conn()?;
            conn.query_row(
                "SELECT path, tier, source_tier, partition_domain, partition_date
                 FROM segments WHERE segment_id = ?1 AND state = ?2",
                params![segment_id, SEGMENT_LIVE],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?
        };
        row.map(|(path, tier, source_tier, domain, date)| {
            Ok(SegmentMeta {
                path,
                tier: parse_tier(&tier)?,
                source_tier: parse_tier(&source_tier)?,
                partition: parse_partition(domain, &date)?,
            })
        })
        .transpose()
    }

    fn insert_staged_segment(
        &self,
        segment_id: Uuid,
        tier: StorageTier,
        rel_path: &str,
        partition: &PartitionKey,
        source_tier: StorageTier,
        record_count: usize,
    ) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO segments (segment_id, tier, path, partition_domain, partition_date,
                                   source_tier, record_count, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                segment_id.to_string(),
                tier.as_str(),
                rel_path,
                partition.domain,
                partition.date_str(),
                source_tier.as_str(),
                record_count as i64,
                SEGMENT_STAGED,
                datetime_to_nanos(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn insert_frames(&self, segment_id: Uuid, locations: &[FrameLocation]) -> ServerResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO segment_frames (segment_id, record_id, frame_offset, payload_len)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for loc in locations {
                stmt.execute(params![
                    segment_id.to_string(),
                    loc.record_id.to_string(),
                    loc.offset as i64,
                    loc.len as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn drop_if_unreferenced(&self, segment_id: &str) -> ServerResult<()> {
        let path: Option<String> = {
            let conn = self.read_conn()?;
            conn.query_row(
                "SELECT s.path FROM segments s
                 WHERE s.segment_id = ?1
                   AND NOT EXISTS (SELECT 1 FROM records r WHERE r.segment_id = s.segment_id)",
                params![segment_id],
                |row| row.get(0),
            )
            .optional()?
        };
        match path {
            Some(path) => self.drop_segment(segment_id, &path),
            None => Ok(()),
        }
    }

    /// Remove the file first; a leftover row is collected by the next cleanup
    fn drop_segment(&self, segment_id: &str, path: &str) -> ServerResult<()> {
        self.segments().remove(path)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM segment_frames WHERE segment_id = ?1",
            params![segment_id],
        )?;
        tx.execute("DELETE FROM segments WHERE segment_id = ?1", params![segment_id])?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::testutil::{append_at, days_ago};
    use crate::traits::{RecordStore, TierStore};
    use tempfile::tempdir;

    fn migrate(store: &SqliteStore, from: StorageTier, to: StorageTier) -> u64 {
        let cutoff = Utc::now();
        let mut moved = 0;
        for partition in store.migration_partitions(from, cutoff).unwrap() {
            let batch = store.migration_batch(&partition, from, cutoff, 100).unwrap();
            let staged = store.copy_to_tier(&partition, to, &batch).unwrap();
            assert!(store.verify_staged(&staged).unwrap().valid);
            moved += store.relabel(&staged).unwrap();
        }
        moved
    }

    #[test]
    fn test_copy_verify_relabel_moves_payloads() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::in_memory_with_data_dir(dir.path()).unwrap();
        let old = days_ago(40);
        let a = append_at(&store, "billing:acct-1", "a", b"alpha", old);
        let b = append_at(&store, "billing:acct-1", "b", b"beta", old);

        assert_eq!(migrate(&store, StorageTier::Hot, StorageTier::Warm), 2);

        let loaded = store.get_record(&a.record_id).unwrap();
        assert_eq!(loaded.storage_tier, StorageTier::Warm);
        assert_eq!(loaded.payload, b"alpha");
        assert_eq!(store.get_record(&b.record_id).unwrap().payload, b"beta");

        // Same content hash: only the tier label changed
        assert_eq!(loaded.content_hash, a.content_hash);

        assert_eq!(migrate(&store, StorageTier::Warm, StorageTier::Cold), 2);
        let cold = store.get_record(&a.record_id).unwrap();
        assert_eq!(cold.storage_tier, StorageTier::Cold);
        assert_eq!(cold.payload, b"alpha");

        // The warm segment had no remaining references and is gone
        let warm_dir = dir.path().join("warm/billing");
        let leftover = std::fs::read_dir(warm_dir.join(a.partition.date_str()))
            .map(|d| d.count())
            .unwrap_or(0);
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_relabel_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::in_memory_with_data_dir(dir.path()).unwrap();
        let old = days_ago(40);
        append_at(&store, "u1", "a", b"alpha", old);

        let cutoff = Utc::now();
        let partition = store
            .migration_partitions(StorageTier::Hot, cutoff)
            .unwrap()
            .remove(0);
        let batch = store
            .migration_batch(&partition, StorageTier::Hot, cutoff, 10)
            .unwrap();
        let staged = store
            .copy_to_tier(&partition, StorageTier::Warm, &batch)
            .unwrap();

        assert_eq!(store.relabel(&staged).unwrap(), 1);
        assert_eq!(store.relabel(&staged).unwrap(), 0);
        assert!(store
            .migration_partitions(StorageTier::Hot, cutoff)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_recent_records_are_not_candidates() {
        let store = SqliteStore::in_memory().unwrap();
        append_at(&store, "u1", "fresh", b"x", Utc::now());

        let cutoff = days_ago(30);
        assert!(store
            .migration_partitions(StorageTier::Hot, cutoff)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_verify_staged_detects_tampered_source_chain() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::in_memory_with_data_dir(dir.path()).unwrap();
        let old = days_ago(40);
        append_at(&store, "u1", "a", b"alpha", old);
        let fresh = append_at(&store, "u2", "b", b"beta", old);

        {
            let conn = store.get_conn().unwrap();
            conn.execute(
                "UPDATE records SET payload = X'00' WHERE record_id = ?1",
                params![fresh.record_id.to_string()],
            )
            .unwrap();
        }

        let cutoff = Utc::now();
        let partition = store
            .migration_partitions(StorageTier::Hot, cutoff)
            .unwrap()
            .remove(0);
        let batch = store
            .migration_batch(&partition, StorageTier::Hot, cutoff, 10)
            .unwrap();
        let staged = store
            .copy_to_tier(&partition, StorageTier::Warm, &batch)
            .unwrap();

        let result = store.verify_staged(&staged).unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_invalid_record_id, Some(fresh.record_id));

        store.discard_staged(&staged).unwrap();
        assert_eq!(store.cleanup_staged().unwrap(), 0);
        assert_eq!(
            store.get_record(&fresh.record_id).unwrap().storage_tier,
            StorageTier::Hot
        );
    }

    #[test]
    fn test_cleanup_removes_interrupted_copies() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::in_memory_with_data_dir(dir.path()).unwrap();
        let record = append_at(&store, "u1", "a", b"alpha", days_ago(40));

        let staged = store
            .copy_to_tier(&record.partition, StorageTier::Warm, &[record.clone()])
            .unwrap();
        let path = dir.path().join(SegmentStore::relative_path(
            StorageTier::Warm,
            &record.partition,
            staged.segment_id,
        ));
        assert!(path.exists());

        // Simulated crash before relabel
        assert_eq!(store.cleanup_staged().unwrap(), 1);
        assert!(!path.exists());
        assert_eq!(
            store.get_record(&record.record_id).unwrap().storage_tier,
            StorageTier::Hot
        );
    }

    #[test]
    fn test_halt_and_resume_partition() {
        let store = SqliteStore::in_memory().unwrap();
        let record = append_at(&store, "u1", "a", b"alpha", days_ago(40));
        let cutoff = Utc::now();

        store.halt_partition(&record.partition, "hash mismatch").unwrap();
        assert!(store
            .migration_partitions(StorageTier::Hot, cutoff)
            .unwrap()
            .is_empty());

        let halted = store.halted_partitions().unwrap();
        assert_eq!(halted.len(), 1);
        assert_eq!(halted[0].partition, record.partition);
        assert_eq!(halted[0].reason, "hash mismatch");

        let batch = vec![store.get_record(&record.record_id).unwrap()];
        assert!(matches!(
            store.copy_to_tier(&record.partition, StorageTier::Warm, &batch),
            Err(ServerError::PartitionHalted(_))
        ));

        assert!(store.resume_partition(&record.partition).unwrap());
        assert!(!store.resume_partition(&record.partition).unwrap());
        assert_eq!(
            store.migration_partitions(StorageTier::Hot, cutoff).unwrap(),
            vec![record.partition]
        );
    }

    #[test]
    fn test_expire_cold_prefix_advances_anchor() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::in_memory_with_data_dir(dir.path()).unwrap();
        let old = days_ago(400);
        let first = append_at(&store, "u1", "a", b"alpha", old);
        let second = append_at(&store, "u1", "b", b"beta", old);
        let kept = append_at(&store, "u1", "c", b"gamma", Utc::now());

        migrate(&store, StorageTier::Hot, StorageTier::Warm);
        migrate(&store, StorageTier::Warm, StorageTier::Cold);

        let plans = store.expiry_plans(days_ago(365), 10).unwrap();
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.chain_key, "u1");
        assert_eq!(plan.through_sequence, 1);
        assert_eq!(plan.through_hash, second.content_hash);
        assert_eq!(plan.record_count, 2);

        assert_eq!(store.expire(plan).unwrap(), 2);
        assert_eq!(store.expire(plan).unwrap(), 0);

        assert!(store.get_record(&first.record_id).is_err());
        let anchor = store.chain_anchor("u1").unwrap();
        assert_eq!(anchor.next_sequence, 2);
        assert_eq!(anchor.prev_hash, second.content_hash);
        assert_eq!(store.get_record(&kept.record_id).unwrap().payload, b"gamma");

        // No cold segment survives holding the expired payloads
        assert_eq!(store.cleanup_staged().unwrap(), 0);
        let cold = dir.path().join("cold/default").join(first.partition.date_str());
        let segments = std::fs::read_dir(cold).map(|d| d.count()).unwrap_or(0);
        assert_eq!(segments, 0);
    }

    #[test]
    fn test_hot_records_block_expiry() {
        let store = SqliteStore::in_memory().unwrap();
        append_at(&store, "u1", "a", b"alpha", days_ago(400));

        assert!(store.expiry_plans(days_ago(365), 10).unwrap().is_empty());
    }
}

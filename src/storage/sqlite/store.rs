// File: src/storage/sqlite/store.rs

use super::config::SqliteConfig;
use super::schema;
use crate::chain::{ChainAnchor, ChainHead, ChainVerification};
use crate::error::{ServerError, ServerResult, StorageError};
use crate::storage::segment::SegmentStore;
use crate::traits::{
    CheckedRecord, EventRecord, ExpiryPlan, HaltedPartition, InsertOutcome, ListFilter,
    PartitionKey, RecordStore, StagedCopy, StorageTier, StoreStats, TierStore, TrailQuery,
    VerificationRun,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite implementation of the record and tier stores
///
/// Hot payloads live inline in `records`; warm and cold payloads live in
/// segment files under `data_dir`. File-backed databases get a separate
/// read connection so queries never wait behind a write transaction.
pub struct SqliteStore {
    /// Write connection (protected by mutex for thread safety)
    conn: Arc<Mutex<Connection>>,

    /// Read connection (WAL readers; absent for in-memory databases)
    reader: Option<Arc<Mutex<Connection>>>,

    segments: SegmentStore,

    config: SqliteConfig,

    healthy: AtomicBool,
}

impl SqliteStore {
    /// Create a new SqliteStore with default configuration
    ///
    /// Creates the database file and schema if they don't exist. Segment
    /// files go to `segments/` next to the database.
    pub fn new<P: AsRef<Path>>(path: P) -> ServerResult<Self> {
        let path = path.as_ref();
        let data_dir = path
            .parent()
            .map(|p| p.join("segments"))
            .unwrap_or_else(|| PathBuf::from("segments"));
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            data_dir,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Create with custom configuration
    pub fn with_config(config: SqliteConfig) -> ServerResult<Self> {
        let conn = Self::open_connection(&config)?;
        schema::create_tables(&conn)?;

        let reader = if config.is_in_memory() {
            None
        } else {
            Some(Arc::new(Mutex::new(Self::open_connection(&config)?)))
        };

        tracing::info!(
            path = %config.path,
            data_dir = %config.data_dir.display(),
            wal = config.wal_mode,
            "Ledger database opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            reader,
            segments: SegmentStore::new(config.data_dir.clone()),
            config,
            healthy: AtomicBool::new(true),
        })
    }

    /// Create an in-memory database (for testing)
    ///
    /// Segment files still need a directory; use
    /// [`SqliteStore::in_memory_with_data_dir`] when migrations are exercised.
    pub fn in_memory() -> ServerResult<Self> {
        let data_dir = std::env::temp_dir().join(format!("ledger-store-{}", uuid::Uuid::new_v4()));
        Self::in_memory_with_data_dir(data_dir)
    }

    /// In-memory database with segment files under `data_dir`
    pub fn in_memory_with_data_dir<P: Into<PathBuf>>(data_dir: P) -> ServerResult<Self> {
        let config = SqliteConfig {
            path: ":memory:".to_string(),
            data_dir: data_dir.into(),
            ..Default::default()
        };
        Self::with_config(config)
    }

    fn open_connection(config: &SqliteConfig) -> ServerResult<Connection> {
        let conn = Connection::open(&config.path).map_err(|e| {
            ServerError::Storage(StorageError::ConnectionFailed(format!(
                "failed to open db: {}",
                e
            )))
        })?;
        Self::configure_connection(&conn, config)?;
        Ok(conn)
    }

    /// Configure SQLite connection pragmas
    fn configure_connection(conn: &Connection, config: &SqliteConfig) -> ServerResult<()> {
        if config.wal_mode && !config.is_in_memory() {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -(config.cache_size_kib as i64))?;
        Ok(())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Compact the database (VACUUM)
    pub fn compact(&self) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }

    /// Get locked write connection for internal operations
    pub(crate) fn get_conn(&self) -> ServerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            self.healthy.store(false, Ordering::Relaxed);
            ServerError::Storage(StorageError::ConnectionFailed("lock poisoned".into()))
        })
    }

    /// Get locked read connection (falls back to the writer for in-memory)
    pub(crate) fn read_conn(&self) -> ServerResult<MutexGuard<'_, Connection>> {
        match &self.reader {
            Some(reader) => reader.lock().map_err(|_| {
                self.healthy.store(false, Ordering::Relaxed);
                ServerError::Storage(StorageError::ConnectionFailed("lock poisoned".into()))
            }),
            None => self.get_conn(),
        }
    }

    pub(crate) fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    pub(crate) fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

impl RecordStore for SqliteStore {
    fn chain_head(&self, chain_key: &str) -> ServerResult<Option<ChainHead>> {
        self.chain_head_impl(chain_key)
    }

    fn find_by_idempotency_key(&self, key: &str) -> ServerResult<Option<EventRecord>> {
        self.find_by_idempotency_key_impl(key)
    }

    fn insert_record(&self, record: &EventRecord) -> ServerResult<InsertOutcome> {
        self.insert_record_impl(record)
    }

    fn get_record(&self, record_id: &uuid::Uuid) -> ServerResult<EventRecord> {
        self.get_record_impl(record_id)
    }

    fn trail_page(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<EventRecord>> {
        self.trail_page_impl(query, after_sequence, limit)
    }

    fn verify_page(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<CheckedRecord>> {
        self.verify_page_impl(query, after_sequence, limit)
    }

    fn checked_record(&self, record_id: &uuid::Uuid) -> ServerResult<CheckedRecord> {
        self.checked_record_impl(record_id)
    }

    fn content_hash_at(&self, chain_key: &str, sequence_no: u64) -> ServerResult<Option<[u8; 32]>> {
        self.content_hash_at_impl(chain_key, sequence_no)
    }

    fn chain_anchor(&self, chain_key: &str) -> ServerResult<ChainAnchor> {
        self.chain_anchor_impl(chain_key)
    }

    fn list_recent(&self, filter: &ListFilter) -> ServerResult<Vec<EventRecord>> {
        self.list_recent_impl(filter)
    }

    fn record_verification(&self, run: &VerificationRun) -> ServerResult<()> {
        self.record_verification_impl(run)
    }

    fn stats(&self) -> ServerResult<StoreStats> {
        self.stats_impl()
    }

    fn is_healthy(&self) -> bool {
        if !self.healthy() {
            return false;
        }
        match self.read_conn() {
            Ok(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl TierStore for SqliteStore {
    fn migration_partitions(
        &self,
        from: StorageTier,
        cutoff: DateTime<Utc>,
    ) -> ServerResult<Vec<PartitionKey>> {
        self.migration_partitions_impl(from, cutoff)
    }

    fn migration_batch(
        &self,
        partition: &PartitionKey,
        from: StorageTier,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> ServerResult<Vec<EventRecord>> {
        self.migration_batch_impl(partition, from, cutoff, limit)
    }

    fn copy_to_tier(
        &self,
        partition: &PartitionKey,
        to: StorageTier,
        records: &[EventRecord],
    ) -> ServerResult<StagedCopy> {
        self.copy_to_tier_impl(partition, to, records)
    }

    fn verify_staged(&self, staged: &StagedCopy) -> ServerResult<ChainVerification> {
        self.verify_staged_impl(staged)
    }

    fn relabel(&self, staged: &StagedCopy) -> ServerResult<u64> {
        self.relabel_impl(staged)
    }

    fn discard_staged(&self, staged: &StagedCopy) -> ServerResult<()> {
        self.discard_staged_impl(staged)
    }

    fn cleanup_staged(&self) -> ServerResult<u64> {
        self.cleanup_staged_impl()
    }

    fn halt_partition(&self, partition: &PartitionKey, reason: &str) -> ServerResult<()> {
        self.halt_partition_impl(partition, reason)
    }

    fn resume_partition(&self, partition: &PartitionKey) -> ServerResult<bool> {
        self.resume_partition_impl(partition)
    }

    fn halted_partitions(&self) -> ServerResult<Vec<HaltedPartition>> {
        self.halted_partitions_impl()
    }

    fn expiry_plans(&self, cutoff: DateTime<Utc>, limit: usize) -> ServerResult<Vec<ExpiryPlan>> {
        self.expiry_plans_impl(cutoff, limit)
    }

    fn expire(&self, plan: &ExpiryPlan) -> ServerResult<u64> {
        self.expire_impl(plan)
    }
}

//! Record store trait definition

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::chain::{ChainAnchor, ChainFields, ChainHead};
use crate::error::ServerResult;

/// Storage class a record currently lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    Hot,
    Warm,
    Cold,
}

impl StorageTier {
    pub const ALL: [StorageTier; 3] = [StorageTier::Hot, StorageTier::Warm, StorageTier::Cold];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Hot => "hot",
            StorageTier::Warm => "warm",
            StorageTier::Cold => "cold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(StorageTier::Hot),
            "warm" => Some(StorageTier::Warm),
            "cold" => Some(StorageTier::Cold),
            _ => None,
        }
    }

    /// Tier a record moves to after this one (`None` for cold)
    pub fn next(&self) -> Option<StorageTier> {
        match self {
            StorageTier::Hot => Some(StorageTier::Warm),
            StorageTier::Warm => Some(StorageTier::Cold),
            StorageTier::Cold => None,
        }
    }
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical address of a record: owning domain plus ingestion date
///
/// Fixed at ingestion, independent of tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub domain: String,
    pub date: NaiveDate,
}

impl PartitionKey {
    pub const DEFAULT_DOMAIN: &'static str = "default";

    /// Partition for a record on `chain_key` ingested at `ingested_at`
    pub fn for_record(chain_key: &str, ingested_at: DateTime<Utc>) -> Self {
        Self {
            domain: chain_domain(chain_key).to_string(),
            date: ingested_at.date_naive(),
        }
    }

    /// Parse `"{domain}/{yyyy-mm-dd}"`
    pub fn parse(s: &str) -> Option<Self> {
        let (domain, date) = s.rsplit_once('/')?;
        if domain.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
        })
    }

    pub fn date_str(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.domain, self.date.format("%Y-%m-%d"))
    }
}

/// Owning domain of a chain key: the prefix before the first `:`
pub fn chain_domain(chain_key: &str) -> &str {
    match chain_key.split_once(':') {
        Some((domain, _)) if !domain.is_empty() => domain,
        _ => PartitionKey::DEFAULT_DOMAIN,
    }
}

/// A committed, immutable ledger record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Unique identifier (UUID v4), assigned at ingestion
    pub record_id: Uuid,

    /// Hash-chain partition
    pub chain_key: String,

    /// Position in the chain, contiguous from 0
    pub sequence_no: u64,

    pub event_type: String,
    pub event_subtype: Option<String>,

    /// Producing component
    pub source: String,

    /// Producer-supplied timestamp (may be skewed)
    pub occurred_at: DateTime<Utc>,

    /// Store-assigned timestamp (authoritative for ordering and tiering)
    pub ingested_at: DateTime<Utc>,

    /// Opaque payload bytes
    pub payload: Vec<u8>,

    /// SHA-256 over the canonical fields and `prev_hash`
    pub content_hash: [u8; 32],

    /// `content_hash` of the previous record in the chain
    pub prev_hash: [u8; 32],

    /// Current storage class (mutated only by the tier manager)
    pub storage_tier: StorageTier,

    /// Caller-supplied event identifier
    pub idempotency_key: String,

    /// Physical partition address
    pub partition: PartitionKey,
}

impl EventRecord {
    /// Fields covered by the content hash
    pub fn chain_fields(&self) -> ChainFields<'_> {
        ChainFields {
            chain_key: &self.chain_key,
            event_type: &self.event_type,
            source: &self.source,
            occurred_at: self.occurred_at,
            payload: &self.payload,
        }
    }

    pub fn head(&self) -> ChainHead {
        ChainHead {
            sequence_no: self.sequence_no,
            content_hash: self.content_hash,
        }
    }
}

/// Result of an atomic insert
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// Record committed
    Inserted,
    /// Idempotency key already committed; carries the original record
    Duplicate(Box<EventRecord>),
}

/// A record loaded for verification
///
/// The metadata row is always present. When the payload copy in the
/// record's tier is missing or unreadable, `payload` is empty and
/// `payload_fault` says why.
#[derive(Debug, Clone)]
pub struct CheckedRecord {
    pub record: EventRecord,
    pub payload_fault: Option<String>,
}

/// Filter for a chain trail read
#[derive(Debug, Clone, Default)]
pub struct TrailQuery {
    pub chain_key: String,
    /// Inclusive lower bound on `ingested_at`
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `ingested_at`
    pub until: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    /// Inclusive sequence range
    pub from_sequence: Option<u64>,
    pub to_sequence: Option<u64>,
}

/// Filter for recent-record listing
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub source: Option<String>,
    pub event_type: Option<String>,
    pub limit: usize,
}

/// Per-tier storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct TierStats {
    pub tier: StorageTier,
    pub record_count: u64,
    pub oldest_ingested_at: Option<DateTime<Utc>>,
    pub newest_ingested_at: Option<DateTime<Utc>>,
}

/// Outcome of one verification pass, persisted for stats
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRun {
    /// `chain:{key}`, `records:{n}` or `migration:{partition}`
    pub target: String,
    pub valid: bool,
    pub checked_count: u64,
    pub first_invalid_record_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Store-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub tiers: Vec<TierStats>,
    pub total_records: u64,
    pub chain_count: u64,
    pub oldest_ingested_at: Option<DateTime<Utc>>,
    pub newest_ingested_at: Option<DateTime<Utc>>,
    pub halted_partitions: Vec<String>,
    pub last_verification: Option<VerificationRun>,
}

/// Durable record storage
///
/// Synchronous by contract; async callers run it under `spawn_blocking`.
/// Every method sees only committed state: a record is either fully visible
/// or absent.
pub trait RecordStore: Send + Sync + 'static {
    /// Last committed position of a chain (`None` if empty)
    fn chain_head(&self, chain_key: &str) -> ServerResult<Option<ChainHead>>;

    /// Record previously committed under an idempotency key
    fn find_by_idempotency_key(&self, key: &str) -> ServerResult<Option<EventRecord>>;

    /// Atomically persist a record
    ///
    /// Fails with `StorageError::ChainConflict` if the durable head no
    /// longer precedes `record`; returns `Duplicate` if the idempotency key
    /// is already committed.
    fn insert_record(&self, record: &EventRecord) -> ServerResult<InsertOutcome>;

    /// Point lookup
    fn get_record(&self, record_id: &Uuid) -> ServerResult<EventRecord>;

    /// One page of a trail in ascending sequence order, strictly after
    /// `after_sequence`
    fn trail_page(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<EventRecord>>;

    /// Like `trail_page`, but a lost or damaged payload copy is reported on
    /// its record instead of failing the page
    fn verify_page(
        &self,
        query: &TrailQuery,
        after_sequence: Option<u64>,
        limit: usize,
    ) -> ServerResult<Vec<CheckedRecord>>;

    /// Point lookup that reports a payload fault on the record
    fn checked_record(&self, record_id: &Uuid) -> ServerResult<CheckedRecord>;

    /// Stored content hash at a chain position, without reading the payload
    fn content_hash_at(&self, chain_key: &str, sequence_no: u64) -> ServerResult<Option<[u8; 32]>>;

    /// Where verification of `chain_key` starts
    fn chain_anchor(&self, chain_key: &str) -> ServerResult<ChainAnchor>;

    /// Most recently ingested records, newest first
    fn list_recent(&self, filter: &ListFilter) -> ServerResult<Vec<EventRecord>>;

    /// Persist a verification outcome
    fn record_verification(&self, run: &VerificationRun) -> ServerResult<()>;

    fn stats(&self) -> ServerResult<StoreStats>;

    fn is_healthy(&self) -> bool;
}

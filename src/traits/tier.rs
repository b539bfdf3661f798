//! Tier migration and retention trait definition

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chain::ChainVerification;
use crate::error::ServerResult;
use crate::traits::{EventRecord, PartitionKey, StorageTier};

/// System chain recording retention expiries; never expired itself
pub const RETENTION_CHAIN_KEY: &str = "ledger:retention";

/// A payload copy written to a destination tier but not yet authoritative
#[derive(Debug, Clone)]
pub struct StagedCopy {
    /// Segment holding the copies
    pub segment_id: Uuid,

    pub partition: PartitionKey,
    pub from: StorageTier,
    pub to: StorageTier,

    /// Records in the segment, in write order
    pub record_ids: Vec<Uuid>,
}

/// A chain prefix eligible for retention expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryPlan {
    pub chain_key: String,
    /// First sequence number still present
    pub from_sequence: u64,
    /// Last sequence number to remove (inclusive)
    pub through_sequence: u64,
    /// `content_hash` of the last removed record; becomes the chain anchor
    pub through_hash: [u8; 32],
    pub record_count: u64,
}

/// Partition whose migration was stopped by an integrity failure
#[derive(Debug, Clone)]
pub struct HaltedPartition {
    pub partition: PartitionKey,
    pub reason: String,
    pub halted_at: DateTime<Utc>,
}

/// Storage operations used by the tier manager
///
/// A migration is `copy_to_tier`, then `verify_staged`, then `relabel`. The
/// tier of a record changes only in `relabel`, so a crash at any earlier
/// point leaves the record where it was plus a staged segment that
/// `cleanup_staged` removes.
pub trait TierStore: Send + Sync + 'static {
    /// Partitions holding records in `from` ingested before `cutoff`,
    /// excluding halted partitions
    fn migration_partitions(
        &self,
        from: StorageTier,
        cutoff: DateTime<Utc>,
    ) -> ServerResult<Vec<PartitionKey>>;

    /// Up to `limit` migration candidates, ordered by chain and sequence,
    /// with payloads loaded from their current tier
    fn migration_batch(
        &self,
        partition: &PartitionKey,
        from: StorageTier,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> ServerResult<Vec<EventRecord>>;

    /// Write payload copies of `records` into a new segment of tier `to`
    fn copy_to_tier(
        &self,
        partition: &PartitionKey,
        to: StorageTier,
        records: &[EventRecord],
    ) -> ServerResult<StagedCopy>;

    /// Re-verify every affected chain end-to-end, reading migrated payloads
    /// back from the staged copy
    fn verify_staged(&self, staged: &StagedCopy) -> ServerResult<ChainVerification>;

    /// Make the staged copy authoritative and drop the source copy
    fn relabel(&self, staged: &StagedCopy) -> ServerResult<u64>;

    /// Remove a staged copy that will not be relabelled
    fn discard_staged(&self, staged: &StagedCopy) -> ServerResult<()>;

    /// Remove staged copies left behind by an interrupted sweep
    fn cleanup_staged(&self) -> ServerResult<u64>;

    fn halt_partition(&self, partition: &PartitionKey, reason: &str) -> ServerResult<()>;

    /// Clear a halt; returns false if the partition was not halted
    fn resume_partition(&self, partition: &PartitionKey) -> ServerResult<bool>;

    fn halted_partitions(&self) -> ServerResult<Vec<HaltedPartition>>;

    /// Chain prefixes whose records are all cold and ingested before `cutoff`
    fn expiry_plans(&self, cutoff: DateTime<Utc>, limit: usize) -> ServerResult<Vec<ExpiryPlan>>;

    /// Physically remove a planned prefix and advance the chain anchor
    ///
    /// Returns the number of records removed; zero if already applied.
    fn expire(&self, plan: &ExpiryPlan) -> ServerResult<u64>;
}

//! Trait definitions for storage, tiering and notifications

pub mod notify;
pub mod store;
pub mod tier;

pub use notify::{
    AlertSink, BroadcastNotifier, CommitNotifier, IntegrityAlert, RecordCommitted,
    TracingAlertSink,
};
pub use store::{
    chain_domain, CheckedRecord, EventRecord, InsertOutcome, ListFilter, PartitionKey,
    RecordStore, StorageTier, StoreStats, TierStats, TrailQuery, VerificationRun,
};
pub use tier::{ExpiryPlan, HaltedPartition, StagedCopy, TierStore, RETENTION_CHAIN_KEY};

//! Ingestion pipeline
//!
//! Accepts candidate events and turns them into immutable, hash-chained
//! records in the hot tier. Appends to one chain are serialized by a
//! per-chain lease; the durable chain head is re-checked inside the insert
//! transaction.

mod candidate;
mod config;
mod idempotency;
mod lease;
mod pipeline;
mod retry;

pub use candidate::CandidateEvent;
pub use config::IngestConfig;
pub use idempotency::IdempotencyCache;
pub use lease::{ChainLease, ChainLeases};
pub use pipeline::{IngestOutcome, IngestPipeline, SYSTEM_SOURCE, TOMBSTONE_EVENT_TYPE};
pub use retry::{is_retryable, run_blocking_with_retry, RetryPolicy};

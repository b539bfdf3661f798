//! ledger-store: immutable hash-chained event ledger with hot/warm/cold tiering

pub mod api;
pub mod background;
pub mod chain;
pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod storage;
pub mod traits;

// Re-exports
pub use error::{ServerError, ServerResult, StorageError};
pub use ingest::{CandidateEvent, IngestOutcome, IngestPipeline};
pub use query::{QueryService, VerificationReport, VerifyTarget};
pub use storage::SqliteStore;
pub use traits::{EventRecord, RecordStore, StorageTier, TierStore};

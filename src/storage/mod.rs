//! Storage module
//!
//! SQLite holds record metadata, hot payloads and chain state; warm and cold
//! payloads live in segment files.

pub mod segment;
pub mod sqlite;

pub use crate::traits::{RecordStore, TierStore};
pub use segment::SegmentStore;
pub use sqlite::{SqliteConfig, SqliteStore};

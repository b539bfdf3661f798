//! HTTP request handlers

mod chains;
mod events;
mod health;
pub(crate) mod helpers;
mod partitions;
mod records;
mod verify;

pub use chains::get_trail;
pub use events::{ingest_event, list_events};
pub use health::health_check;
pub use partitions::{list_halted, resume_partition};
pub use records::{get_record, tombstone_record};
pub use verify::{get_stats, verify};

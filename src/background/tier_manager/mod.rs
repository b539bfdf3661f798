// File: src/background/tier_manager/mod.rs

//! Tier manager background job
//!
//! Moves aged records hot→warm→cold with a copy, verify, relabel protocol
//! and expires cold chain prefixes past the retention period.

mod config;
mod job;
mod logic;
mod retention;


pub use config::TierManagerConfig;
pub use job::TierManager;
pub use logic::SweepReport;
pub use retention::RETENTION_EVENT_TYPE;

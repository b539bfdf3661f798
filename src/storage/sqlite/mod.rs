// File: src/storage/sqlite/mod.rs

mod config;
mod convert;
mod records;
mod schema;
mod store;
mod tiers;

#[cfg(test)]
pub(crate) mod testutil;

// Public exports
pub use config::SqliteConfig;
pub use schema::SCHEMA_VERSION;
pub use store::SqliteStore;

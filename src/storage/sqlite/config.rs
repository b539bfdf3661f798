// File: src/storage/sqlite/config.rs

use std::path::PathBuf;

/// SQLite storage backend configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to database file (or ":memory:" for in-memory)
    pub path: String,

    /// Root directory for warm/cold segment files
    pub data_dir: PathBuf,

    /// Enable WAL mode for concurrent reads
    pub wal_mode: bool,

    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,

    /// Page cache size in KiB
    pub cache_size_kib: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "ledger.db".to_string(),
            data_dir: PathBuf::from("./data/raw-store"),
            wal_mode: true,
            busy_timeout_ms: 5000,
            cache_size_kib: 64_000,
        }
    }
}

impl SqliteConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: std::env::var("LEDGER_DATABASE_PATH").unwrap_or(defaults.path),
            data_dir: std::env::var("LEDGER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wal_mode: std::env::var("LEDGER_SQLITE_WAL")
                .ok()
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.wal_mode),
            busy_timeout_ms: std::env::var("LEDGER_SQLITE_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.busy_timeout_ms),
            cache_size_kib: std::env::var("LEDGER_SQLITE_CACHE_KIB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_size_kib),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

//! Query layer configuration

/// Query layer configuration
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Deadline for a single query (milliseconds)
    pub timeout_ms: u64,

    /// Default and maximum number of records a trail returns
    pub max_trail_limit: usize,

    /// Records fetched per storage round trip
    pub page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_trail_limit: 10_000,
            page_size: 500,
        }
    }
}

impl QueryConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_ms: std::env::var("LEDGER_QUERY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            max_trail_limit: std::env::var("LEDGER_MAX_TRAIL_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_trail_limit),
            page_size: std::env::var("LEDGER_QUERY_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.page_size),
        }
    }
}

// File: src/background/tier_manager/config.rs

/// Tier manager configuration
#[derive(Debug, Clone)]
pub struct TierManagerConfig {
    /// How often to run a sweep (seconds)
    pub interval_secs: u64,

    /// Records older than this (by `ingested_at`) leave the hot tier
    pub hot_max_age_days: u32,

    /// Records older than this leave the warm tier
    pub warm_max_age_days: u32,

    /// Maximum records per copy-verify-relabel batch
    pub batch_size: usize,

    /// Cold records older than this are expired; `None` disables expiry
    pub retention_days: Option<u32>,

    /// Maximum chains expired per sweep
    pub expiry_chains_per_sweep: usize,
}

impl Default for TierManagerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            hot_max_age_days: 30,
            warm_max_age_days: 365,
            batch_size: 500,
            retention_days: None,
            expiry_chains_per_sweep: 100,
        }
    }
}

impl TierManagerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval_secs: std::env::var("LEDGER_TIER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.interval_secs),
            hot_max_age_days: std::env::var("LEDGER_HOT_MAX_AGE_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hot_max_age_days),
            warm_max_age_days: std::env::var("LEDGER_WARM_MAX_AGE_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.warm_max_age_days),
            batch_size: std::env::var("LEDGER_TIER_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            retention_days: std::env::var("LEDGER_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok()),
            expiry_chains_per_sweep: std::env::var("LEDGER_EXPIRY_CHAINS_PER_SWEEP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.expiry_chains_per_sweep),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = TierManagerConfig::default();
        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.hot_max_age_days, 30);
        assert_eq!(config.warm_max_age_days, 365);
        assert_eq!(config.batch_size, 500);
        assert!(config.retention_days.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("LEDGER_HOT_MAX_AGE_DAYS", "7");
        std::env::set_var("LEDGER_RETENTION_DAYS", "2555");
        std::env::set_var("LEDGER_TIER_BATCH_SIZE", "0");

        let config = TierManagerConfig::from_env();
        assert_eq!(config.hot_max_age_days, 7);
        assert_eq!(config.retention_days, Some(2555));
        assert_eq!(config.batch_size, 500);

        std::env::remove_var("LEDGER_HOT_MAX_AGE_DAYS");
        std::env::remove_var("LEDGER_RETENTION_DAYS");
        std::env::remove_var("LEDGER_TIER_BATCH_SIZE");
    }
}

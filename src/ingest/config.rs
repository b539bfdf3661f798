//! Ingestion pipeline configuration

/// Ingestion pipeline configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum payload size in bytes (larger payloads are rejected)
    pub max_payload_bytes: usize,

    /// Maximum length of key and tag fields in bytes
    pub max_field_len: usize,

    /// How long to wait for a chain lease (milliseconds)
    pub lease_timeout_ms: u64,

    /// Lifetime of idempotency cache entries (seconds)
    pub idempotency_ttl_secs: u64,

    /// Maximum number of idempotency cache entries
    pub idempotency_capacity: usize,

    /// Number of attempts on transient storage errors
    pub retry_count: u32,

    /// Base delay for exponential backoff (milliseconds)
    pub retry_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    pub retry_max_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            max_field_len: 256,
            lease_timeout_ms: 2000,
            idempotency_ttl_secs: 600,
            idempotency_capacity: 100_000,
            retry_count: 3,
            retry_base_ms: 10,
            retry_max_delay_ms: 1000,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_payload_bytes: std::env::var("LEDGER_MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_payload_bytes),
            max_field_len: std::env::var("LEDGER_MAX_FIELD_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_field_len),
            lease_timeout_ms: std::env::var("LEDGER_LEASE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.lease_timeout_ms),
            idempotency_ttl_secs: std::env::var("LEDGER_IDEMPOTENCY_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.idempotency_ttl_secs),
            idempotency_capacity: std::env::var("LEDGER_IDEMPOTENCY_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.idempotency_capacity),
            retry_count: std::env::var("LEDGER_INGEST_RETRY_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_count),
            retry_base_ms: std::env::var("LEDGER_INGEST_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_base_ms),
            retry_max_delay_ms: std::env::var("LEDGER_INGEST_RETRY_MAX_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_values() {
        let config = IngestConfig::default();
        assert_eq!(config.max_payload_bytes, 1_048_576);
        assert_eq!(config.max_field_len, 256);
        assert_eq!(config.lease_timeout_ms, 2000);
        assert_eq!(config.idempotency_ttl_secs, 600);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_base_ms, 10);
    }

    #[test]
    #[serial]
    fn test_from_env_with_custom_values() {
        std::env::set_var("LEDGER_MAX_PAYLOAD_BYTES", "4096");
        std::env::set_var("LEDGER_LEASE_TIMEOUT_MS", "50");
        std::env::set_var("LEDGER_INGEST_RETRY_COUNT", "5");

        let config = IngestConfig::from_env();
        assert_eq!(config.max_payload_bytes, 4096);
        assert_eq!(config.lease_timeout_ms, 50);
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.max_field_len, 256);

        std::env::remove_var("LEDGER_MAX_PAYLOAD_BYTES");
        std::env::remove_var("LEDGER_LEASE_TIMEOUT_MS");
        std::env::remove_var("LEDGER_INGEST_RETRY_COUNT");
    }

    #[test]
    #[serial]
    fn test_from_env_with_invalid_values() {
        std::env::set_var("LEDGER_MAX_FIELD_LEN", "not_a_number");

        let config = IngestConfig::from_env();
        assert_eq!(config.max_field_len, 256);

        std::env::remove_var("LEDGER_MAX_FIELD_LEN");
    }
}

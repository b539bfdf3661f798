//! Server configuration

use crate::background::BackgroundConfig;
use crate::ingest::IngestConfig;
use crate::query::QueryConfig;
use crate::storage::SqliteConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Capacity of the commit notification channel
    pub notify_capacity: usize,
    pub sqlite: SqliteConfig,
    pub ingest: IngestConfig,
    pub query: QueryConfig,
    pub background: BackgroundConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8003,
            log_level: "info".to_string(),
            notify_capacity: 1024,
            sqlite: SqliteConfig::default(),
            ingest: IngestConfig::default(),
            query: QueryConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl Config {
    /// Load every subsystem's configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("LEDGER_HOST").unwrap_or(defaults.host),
            port: std::env::var("LEDGER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("LEDGER_LOG_LEVEL").unwrap_or(defaults.log_level),
            notify_capacity: std::env::var("LEDGER_NOTIFY_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.notify_capacity),
            sqlite: SqliteConfig::from_env(),
            ingest: IngestConfig::from_env(),
            query: QueryConfig::from_env(),
            background: BackgroundConfig::from_env(),
        }
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.bind_addr(), "127.0.0.1:8003");
        assert_eq!(config.log_level, "info");
        assert!(!config.background.disabled);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("LEDGER_PORT", "9100");
        std::env::set_var("LEDGER_BACKGROUND_DISABLED", "1");
        std::env::set_var("LEDGER_NOTIFY_CAPACITY", "0");

        let config = Config::from_env();
        assert_eq!(config.port, 9100);
        assert!(config.background.disabled);
        assert_eq!(config.notify_capacity, 1024);

        std::env::remove_var("LEDGER_PORT");
        std::env::remove_var("LEDGER_BACKGROUND_DISABLED");
        std::env::remove_var("LEDGER_NOTIFY_CAPACITY");
    }

    #[test]
    #[serial]
    fn test_config_invalid_port_falls_back() {
        std::env::set_var("LEDGER_PORT", "not-a-port");
        assert_eq!(Config::from_env().port, 8003);
        std::env::remove_var("LEDGER_PORT");
    }
}

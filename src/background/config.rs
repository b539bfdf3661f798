// File: src/background/config.rs

use super::tier_manager::TierManagerConfig;

/// Global background jobs configuration
#[derive(Debug, Clone, Default)]
pub struct BackgroundConfig {
    /// Disable all background jobs (for testing)
    pub disabled: bool,

    pub tier_manager: TierManagerConfig,
}

impl BackgroundConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            disabled: std::env::var("LEDGER_BACKGROUND_DISABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            tier_manager: TierManagerConfig::from_env(),
        }
    }
}

//! Configuration management for loanwatch
//!
//! Loads from optional config files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub telegram: TelegramConfig,
    pub dashboard: DashboardConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// TWAP window width in seconds
    pub twap_window_seconds: u64,
    /// Circuit-breaker relative change threshold in percent
    pub circuit_breaker_pct: f64,
    /// Below this many contributing sources a SOURCE_DEGRADED event is emitted
    pub min_sources: usize,
    /// Oracle tick period in milliseconds
    pub price_poll_interval_ms: u64,
    /// A source whose last tick is older than this is stale
    pub staleness_ms: i64,
    /// Fixed reconnect cadence per source in milliseconds
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Bot API base URL; overridable for tests
    pub api_url: String,
    /// Taken from TELEGRAM_BOT_TOKEN when not set explicitly
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the loan snapshot
    pub data_dir: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Oracle defaults
            .set_default("oracle.twap_window_seconds", 300)?
            .set_default("oracle.circuit_breaker_pct", 10.0)?
            .set_default("oracle.min_sources", 1)?
            .set_default("oracle.price_poll_interval_ms", 5000)?
            .set_default("oracle.staleness_ms", 30_000)?
            .set_default("oracle.reconnect_delay_ms", 5000)?
            // Telegram defaults
            .set_default("telegram.enabled", true)?
            .set_default("telegram.api_url", "https://api.telegram.org")?
            // Dashboard defaults
            .set_default("dashboard.enabled", true)?
            .set_default("dashboard.port", 8080)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (LOANWATCH_*)
            .add_source(Environment::with_prefix("LOANWATCH").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if app_config.telegram.bot_token.is_none() {
            app_config.telegram.bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        }

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "poll={}ms twap={}s breaker={}% min_sources={} dashboard={} telegram={}",
            self.oracle.price_poll_interval_ms,
            self.oracle.twap_window_seconds,
            self.oracle.circuit_breaker_pct,
            self.oracle.min_sources,
            self.dashboard.enabled,
            self.telegram.enabled && self.telegram.bot_token.is_some(),
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

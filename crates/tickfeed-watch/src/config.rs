//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tickfeed_agg::AggregatorOptions;
use tickfeed_core::{DEFAULT_HISTORY_LENGTH, DEFAULT_QUOTE};
use tickfeed_ws::{ConnectionConfig, ReconnectPolicy};

/// Watcher configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket feed URL.
    pub feed_url: String,
    /// REST base URL for initial snapshot seeding. Seeding is skipped when
    /// unset.
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Symbols to watch (base assets, e.g. ["BTC", "ETH"]).
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Quote currency for channel keys.
    #[serde(default = "default_quote")]
    pub quote: String,
    /// Per-symbol price history bound.
    #[serde(default = "default_history_length")]
    pub history_length: usize,
    /// Snapshot publication cadence (ms).
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Connection behavior.
    #[serde(default)]
    pub connection: ConnectionSettings,
}

/// Connection tuning, all optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Whether to reconnect automatically after a drop.
    #[serde(default = "default_true")]
    pub reconnect: bool,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Idle timeout before a silent stream is cycled (ms).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_quote() -> String {
    DEFAULT_QUOTE.to_string()
}

fn default_history_length() -> usize {
    DEFAULT_HISTORY_LENGTH
}

fn default_throttle_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_idle_timeout_ms() -> u64 {
    90_000
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect: default_true(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Translate to aggregator options.
    pub fn aggregator_options(&self) -> AggregatorOptions {
        let reconnect = if self.connection.reconnect {
            ReconnectPolicy::Always
        } else {
            ReconnectPolicy::Never
        };

        AggregatorOptions {
            quote: self.quote.clone(),
            history_length: self.history_length,
            throttle_ms: self.throttle_ms,
            connection: ConnectionConfig {
                url: self.feed_url.clone(),
                reconnect,
                max_reconnect_attempts: self.connection.max_reconnect_attempts,
                reconnect_base_delay_ms: self.connection.reconnect_base_delay_ms,
                reconnect_max_delay_ms: self.connection.reconnect_max_delay_ms,
                idle_timeout_ms: self.connection.idle_timeout_ms,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            feed_url = "wss://stream.example.com/ws"
            symbols = ["BTC", "ETH"]
            "#,
        )
        .unwrap();

        assert_eq!(config.quote, "USDT");
        assert_eq!(config.history_length, 20);
        assert_eq!(config.throttle_ms, 1000);
        assert!(config.connection.reconnect);
        assert!(config.rest_url.is_none());
    }

    #[test]
    fn test_full_config_round_trip() {
        let config: AppConfig = toml::from_str(
            r#"
            feed_url = "wss://stream.example.com/ws"
            rest_url = "https://api.example.com"
            symbols = ["BTC"]
            quote = "USDC"
            history_length = 5
            throttle_ms = 250

            [connection]
            reconnect = false
            idle_timeout_ms = 30000
            "#,
        )
        .unwrap();

        assert_eq!(config.quote, "USDC");
        assert_eq!(config.history_length, 5);
        assert!(!config.connection.reconnect);

        let options = config.aggregator_options();
        assert_eq!(options.connection.reconnect, ReconnectPolicy::Never);
        assert_eq!(options.connection.idle_timeout_ms, 30000);
        assert_eq!(options.throttle_ms, 250);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = toml::from_str::<AppConfig>("symbols = 5");
        assert!(result.is_err());
    }
}

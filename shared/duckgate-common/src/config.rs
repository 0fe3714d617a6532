//! Server configuration
//!
//! Loaded from environment variables with sane defaults so the server can
//! start with zero configuration against a local database file.

use serde::{Deserialize, Serialize};
use std::env;

/// Flush after this many appended rows
const DEFAULT_FLUSH_ROW_INTERVAL: i64 = 100_000;

/// Flush once this many bytes accumulated since the last flush. Kept
/// conservatively below DuckDB's 4MB per-flush ceiling because row sizes vary
/// and a few oversized rows can hit the hard cap long before the row-count
/// threshold does.
const DEFAULT_FLUSH_BYTES_LIMIT: u64 = 3 * 1024 * 1024;

/// Bounded line-channel capacity between the body reader and the append
/// session; bounds memory regardless of total stream length.
const DEFAULT_LINE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Row-count flush threshold for append sessions
    pub flush_row_interval: i64,
    /// Byte-ceiling flush threshold for append sessions
    pub flush_bytes_limit: u64,
    /// Capacity of the bounded channel between body reader and appender
    pub line_channel_capacity: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            flush_row_interval: env::var("DUCKGATE_FLUSH_ROW_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FLUSH_ROW_INTERVAL),
            flush_bytes_limit: env::var("DUCKGATE_FLUSH_BYTES_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FLUSH_BYTES_LIMIT),
            line_channel_capacity: env::var("DUCKGATE_LINE_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LINE_CHANNEL_CAPACITY),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            flush_row_interval: DEFAULT_FLUSH_ROW_INTERVAL,
            flush_bytes_limit: DEFAULT_FLUSH_BYTES_LIMIT,
            line_channel_capacity: DEFAULT_LINE_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.flush_row_interval, 100_000);
        assert_eq!(config.flush_bytes_limit, 3 * 1024 * 1024);
        assert_eq!(config.line_channel_capacity, 1024);
    }

    #[test]
    fn test_config_from_env_overrides() {
        env::set_var("DUCKGATE_FLUSH_ROW_INTERVAL", "500");
        env::set_var("DUCKGATE_FLUSH_BYTES_LIMIT", "4096");

        let config = ServerConfig::from_env();
        assert_eq!(config.flush_row_interval, 500);
        assert_eq!(config.flush_bytes_limit, 4096);

        env::remove_var("DUCKGATE_FLUSH_ROW_INTERVAL");
        env::remove_var("DUCKGATE_FLUSH_BYTES_LIMIT");
    }

    #[test]
    fn test_config_ignores_unparseable_values() {
        env::set_var("DUCKGATE_LINE_CHANNEL_CAPACITY", "not-a-number");
        let config = ServerConfig::from_env();
        assert_eq!(config.line_channel_capacity, 1024);
        env::remove_var("DUCKGATE_LINE_CHANNEL_CAPACITY");
    }
}

//! Node configuration.

use std::str::FromStr;
use std::time::Duration;

use fxwallet_common::constants;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Connect and ping deadline.
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/fxwallet".to_string(),
            max_connections: 10,
            connect_timeout: constants::connect_timeout(),
        }
    }
}

/// Quote feed configuration.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Time between quote table refreshes.
    pub refresh_interval: Duration,
    /// Time between simulated feed moves.
    pub feed_step: Duration,
    /// Write refreshed rates to the `courses` table.
    pub record_history: bool,
    /// Largest accepted gap between a client-quoted and the current rate.
    pub rate_tolerance: f64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            refresh_interval: constants::refresh_interval(),
            feed_step: constants::feed_step(),
            record_history: true,
            rate_tolerance: constants::RATE_TOLERANCE,
        }
    }
}

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Quote configuration.
    pub quotes: QuoteConfig,
    /// Deadline for one ledger operation.
    pub operation_timeout: Duration,
    /// Log filter directives used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            quotes: QuoteConfig::default(),
            operation_timeout: constants::operation_timeout(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse are skipped and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        parse_into(&lookup, "FXWALLET_DB_MAX_CONNECTIONS", &mut config.database.max_connections);
        parse_secs_into(&lookup, "FXWALLET_CONNECT_TIMEOUT_SECS", &mut config.database.connect_timeout);
        parse_secs_into(&lookup, "FXWALLET_OPERATION_TIMEOUT_SECS", &mut config.operation_timeout);
        parse_secs_into(&lookup, "FXWALLET_REFRESH_INTERVAL_SECS", &mut config.quotes.refresh_interval);
        parse_secs_into(&lookup, "FXWALLET_FEED_STEP_SECS", &mut config.quotes.feed_step);
        parse_into(&lookup, "FXWALLET_RECORD_HISTORY", &mut config.quotes.record_history);
        parse_into(&lookup, "FXWALLET_RATE_TOLERANCE", &mut config.quotes.rate_tolerance);

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("Max connections cannot be 0".to_string());
        }

        if self.database.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err("Timeouts must be positive".to_string());
        }

        if self.quotes.refresh_interval.is_zero() || self.quotes.feed_step.is_zero() {
            return Err("Quote intervals must be positive".to_string());
        }

        if !self.quotes.rate_tolerance.is_finite() || self.quotes.rate_tolerance < 0.0 {
            return Err("Rate tolerance must be a non-negative number".to_string());
        }

        self.env_filter(None)?;

        Ok(())
    }

    /// Build the tracing filter from `rust_log` when given, falling back to
    /// the configured log level.
    pub fn env_filter(&self, rust_log: Option<String>) -> Result<EnvFilter, String> {
        let directives = rust_log.unwrap_or_else(|| self.log_level.clone());
        EnvFilter::try_new(&directives)
            .map_err(|e| format!("Invalid log filter {directives:?}: {e}"))
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable setting"),
        }
    }
}

fn parse_secs_into(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    let mut secs = target.as_secs();
    parse_into(lookup, key, &mut secs);
    *target = Duration::from_secs(secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quotes.refresh_interval, Duration::from_secs(10));
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/wallets"),
            ("FXWALLET_REFRESH_INTERVAL_SECS", "3"),
            ("FXWALLET_RECORD_HISTORY", "false"),
            ("FXWALLET_RATE_TOLERANCE", "0.001"),
        ]));

        assert_eq!(config.database.url, "postgres://db/wallets");
        assert_eq!(config.quotes.refresh_interval, Duration::from_secs(3));
        assert!(!config.quotes.record_history);
        assert_eq!(config.quotes.rate_tolerance, 0.001);
    }

    #[test]
    fn test_unparseable_value_keeps_default() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("FXWALLET_DB_MAX_CONNECTIONS", "many"),
            ("FXWALLET_FEED_STEP_SECS", "-1"),
        ]));

        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.quotes.feed_step, Duration::from_secs(5));
    }

    #[test]
    fn test_log_filter_falls_back_to_configured_level() {
        let config = NodeConfig::from_lookup(lookup(&[("LOG_LEVEL", "debug")]));
        assert_eq!(config.log_level, "debug");

        let filter = config.env_filter(None).unwrap();
        assert_eq!(filter.to_string(), "debug");

        let filter = config.env_filter(Some("warn".to_string())).unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = NodeConfig::from_lookup(lookup(&[("LOG_LEVEL", "fxwallet_node=loudest")]));

        assert!(config.env_filter(None).is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = NodeConfig::default();
        config.quotes.refresh_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.quotes.rate_tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.database.url.clear();
        assert!(config.validate().is_err());
    }
}

//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::backend::types::Exchange;
use crate::market_data::candle::Interval;
use crate::market_data::market_hours::MarketHours;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Backend REST and live-feed endpoints
    pub backend: BackendConfig,

    /// Exchange trading session
    pub market: MarketConfig,

    /// Chart defaults
    pub chart: ChartConfig,

    /// Credentials lookup
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// REST API base URL
    pub rest_url: String,

    /// Live feed WebSocket URL
    pub ws_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Delay between reconnect attempts in milliseconds
    pub reconnect_interval_ms: u64,

    /// Maximum reconnection attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Seconds to wait for the feed's `connection_response`
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// Exchange offset from UTC in minutes
    pub utc_offset_minutes: i32,

    /// Session open, exchange-local `HH:MM`
    pub open: String,

    /// Session close, exchange-local `HH:MM`
    pub close: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    /// Interval selected when a view opens
    pub default_interval: String,

    /// Exchange assumed when none is given
    pub default_exchange: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding the backend bearer token
    pub token_env: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Absolute or relative path to the rolling log file
    pub file_path: String,
}

fn default_handshake_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log: LogConfig::default(),
            backend: BackendConfig::default(),
            market: MarketConfig::default(),
            chart: ChartConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            rest_url: "http://localhost:5000/api/stocks".to_string(),
            ws_url: "ws://localhost:5000/feed".to_string(),
            timeout_seconds: 10,
            reconnect_interval_ms: 1000,
            max_reconnect_attempts: 5,
            handshake_timeout_seconds: default_handshake_timeout(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 330,
            open: "09:15".to_string(),
            close: "15:30".to_string(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            default_interval: "1d".to_string(),
            default_exchange: "N".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: "SCRIPWATCH_AUTH_TOKEN".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/scripwatch.log".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }
}

impl MarketConfig {
    /// Build the market-hours oracle for this session definition
    pub fn market_hours(&self) -> Result<MarketHours> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .with_context(|| format!("Invalid UTC offset: {} minutes", self.utc_offset_minutes))?;
        let open = parse_session_time(&self.open)?;
        let close = parse_session_time(&self.close)?;
        if close <= open {
            anyhow::bail!("market.close ({}) must be after market.open ({})", self.close, self.open);
        }
        Ok(MarketHours::new(offset, open, close))
    }
}

impl ChartConfig {
    pub fn interval(&self) -> Result<Interval> {
        self.default_interval
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }

    pub fn exchange(&self) -> Result<Exchange> {
        Exchange::parse(&self.default_exchange)
            .with_context(|| format!("Invalid default exchange: {}", self.default_exchange))
    }
}

fn parse_session_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("Invalid session time '{}', expected HH:MM", value))
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // SCRIPWATCH_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("SCRIPWATCH_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // SCRIPWATCH_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("SCRIPWATCH_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // SCRIPWATCH_REST_URL - REST API URL
        if let Ok(rest_url) = env::var("SCRIPWATCH_REST_URL") {
            self.backend.rest_url = rest_url;
        }

        // SCRIPWATCH_WS_URL - live feed URL
        if let Ok(ws_url) = env::var("SCRIPWATCH_WS_URL") {
            self.backend.ws_url = ws_url;
        }

        // SCRIPWATCH_TIMEOUT_SECONDS - request timeout
        if let Ok(timeout) = env::var("SCRIPWATCH_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.backend.timeout_seconds = value;
            }
        }

        // SCRIPWATCH_RECONNECT_INTERVAL_MS - reconnect delay
        if let Ok(interval) = env::var("SCRIPWATCH_RECONNECT_INTERVAL_MS") {
            if let Ok(value) = interval.parse::<u64>() {
                self.backend.reconnect_interval_ms = value;
            }
        }

        // SCRIPWATCH_MAX_RECONNECT_ATTEMPTS - reconnect budget
        if let Ok(attempts) = env::var("SCRIPWATCH_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(value) = attempts.parse::<u32>() {
                self.backend.max_reconnect_attempts = value;
            }
        }

        // SCRIPWATCH_DEFAULT_INTERVAL - initial chart interval
        if let Ok(interval) = env::var("SCRIPWATCH_DEFAULT_INTERVAL") {
            self.chart.default_interval = interval;
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.backend.rest_url.trim().is_empty() {
            anyhow::bail!("backend.rest_url must not be empty");
        }

        if self.backend.ws_url.trim().is_empty() {
            anyhow::bail!("backend.ws_url must not be empty");
        }

        if self.backend.timeout_seconds == 0 {
            anyhow::bail!("Timeout must be greater than 0");
        }

        if self.backend.max_reconnect_attempts == 0 {
            anyhow::bail!("backend.max_reconnect_attempts must be greater than 0");
        }

        if self.backend.handshake_timeout_seconds == 0 {
            anyhow::bail!("backend.handshake_timeout_seconds must be greater than 0");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        self.market.market_hours()?;
        self.chart.interval()?;
        self.chart.exchange()?;

        Ok(())
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        println!("Current configuration:");
        println!("{}", content);
        Ok(())
    }

    /// Display configuration management help
    pub fn display_help() -> Result<()> {
        println!("Configuration management commands:");
        println!("  scripwatch config show    - Show current configuration");
        println!("  scripwatch config reset   - Write default configuration to the config file");
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(action: &Option<crate::cli::ConfigAction>, path: &str) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) => {
                let config = Config::load_or_default(path);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save_to_file(path)?;
                println!("Configuration reset to defaults in {}", path);
                default_config.display()?;
            }
            None => {
                Config::display_help()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.max_reconnect_attempts, 5);
        assert_eq!(config.backend.reconnect_interval_ms, 1000);
        assert_eq!(config.chart.interval().unwrap(), Interval::OneDay);
    }

    #[test]
    fn test_invalid_session_times() {
        let mut config = Config::default();
        config.market.close = "09:00".to_string();
        assert!(config.validate().is_err());

        config.market.close = "25:99".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let mut config = Config::default();
        config.chart.default_interval = "7m".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.backend.rest_url, deserialized.backend.rest_url);
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.chart.default_interval = "15m".to_string();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.chart.default_interval, "15m");
    }
}

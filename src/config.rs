//! Configuration module for Gator.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::{GatorError, Result};

/// User agent sent with every feed request.
pub const DEFAULT_USER_AGENT: &str = "Gator/0.1 (+https://github.com/PietPadda/aggregator)";

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/gator.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/gator.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Time between two polling cycles, as a duration string ("30s", "5m", "1h").
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Timeout for a single feed fetch in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

impl SchedulerConfig {
    /// Parse the configured interval.
    pub fn poll_interval(&self) -> Result<PollInterval> {
        self.interval.parse()
    }

    /// Fetch timeout as a duration.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Feed fetcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// User agent string identifying the aggregator.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_feed_size_bytes: default_max_feed_size(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Feed fetcher configuration.
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(GatorError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration with environment overrides, falling back to the
    /// defaults only when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load_with_env(path) {
            Err(GatorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
            result => result,
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| GatorError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `GATOR_DB_PATH`: Override the database path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("GATOR_DB_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - The fetch timeout is zero
    /// - The maximum feed size is zero
    ///
    /// The scheduler interval is checked by the aggregator command, which
    /// may override it.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.fetch_timeout_secs == 0 {
            return Err(GatorError::Config(
                "scheduler.fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.fetcher.max_feed_size_bytes == 0 {
            return Err(GatorError::Config(
                "fetcher.max_feed_size_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Time between two polling cycles.
///
/// Parsed once at startup from a duration string such as `"30s"`, `"5m"`,
/// `"1h"` or `"1h30m"`. Zero is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    /// Create an interval from a duration.
    pub fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(GatorError::Config(
                "polling interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self(duration))
    }

    /// The interval as a duration.
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for PollInterval {
    type Err = GatorError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(GatorError::Config("polling interval is empty".to_string()));
        }
        let duration = humantime::parse_duration(trimmed).map_err(|e| {
            GatorError::Config(format!("invalid polling interval {trimmed:?}: {e}"))
        })?;
        Self::new(duration)
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

//! Configuration file parser for `feedpipe.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged as warnings, since they are
//! usually typos. Values are validated after parsing.
//!
//! Nothing below `main` reads configuration from the environment; the
//! resulting structs are handed to [`Fetcher::new`](crate::feed::Fetcher::new)
//! and [`BatchRunner::new`](crate::batch::BatchRunner::new).
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file, or `:memory:`.
    pub database_path: String,

    pub fetch: FetchConfig,

    pub batch: BatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedpipe.db".to_string(),
            fetch: FetchConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Settings for the HTTP fetcher (`[fetch]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Identifying User-Agent sent with every request.
    pub user_agent: String,

    /// Per-request budget. Expiry is reported as a timeout, not a network error.
    pub timeout_secs: u64,

    /// Upper bound on a response body.
    pub max_body_bytes: usize,

    /// Permit feeds on localhost and private address ranges.
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("feedpipe/{} (+feed ingestion)", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the batch orchestrator (`[batch]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Added to the completion time of a successful run to get `next_fetch_at`.
    pub fetch_interval_minutes: u64,

    /// Feeds processed at the same time within one run.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            fetch_interval_minutes: 60,
            max_concurrency: 4,
        }
    }
}

impl BatchConfig {
    pub fn fetch_interval_secs(&self) -> i64 {
        i64::try_from(self.fetch_interval_minutes.saturating_mul(60)).unwrap_or(i64::MAX)
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 3] = ["database_path", "fetch", "batch"];
    const KNOWN_FETCH_KEYS: [&'static str; 4] = [
        "user_agent",
        "timeout_secs",
        "max_body_bytes",
        "allow_private_hosts",
    ];
    const KNOWN_BATCH_KEYS: [&'static str; 2] = ["fetch_interval_minutes", "max_concurrency"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            database = %config.database_path,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, None, &Self::KNOWN_KEYS);
            if let Some(toml::Value::Table(fetch)) = raw.get("fetch") {
                warn_unknown_keys(fetch, Some("fetch"), &Self::KNOWN_FETCH_KEYS);
            }
            if let Some(toml::Value::Table(batch)) = raw.get("batch") {
                warn_unknown_keys(batch, Some("batch"), &Self::KNOWN_BATCH_KEYS);
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "database_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "fetch.user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "fetch.max_body_bytes",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batch.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "batch.max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn warn_unknown_keys(table: &toml::Table, section: Option<&str>, known: &[&str]) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            match section {
                Some(section) => {
                    tracing::warn!(section = %section, key = %key, "Unknown key in config file, ignoring")
                }
                None => tracing::warn!(key = %key, "Unknown key in config file, ignoring"),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Configuration: optional TOML file at `~/.config/feedrelay/config.toml`,
//! overridden by environment variables.
//!
//! A missing or empty file yields `Config::default()`. Unknown keys are
//! accepted but logged as a warning in case they are typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use secrecy::SecretString;

use crate::feed::{FeedSource, FetchOptions, PollerConfig};
use crate::language::Language;
use crate::util::validate_http_url;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "FEEDRELAY_CONFIG";

pub const TOKEN_ENV: &str = "DISCORD_TOKEN";
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";
pub const POLL_INTERVAL_ENV: &str = "RSS_CHECK_INTERVAL";
pub const RETENTION_DAYS_ENV: &str = "RETENTION_DAYS";
pub const API_BASE_ENV: &str = "DISCORD_API_BASE";

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

    /// A setting required by the requested command is absent
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks `discord_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot token; `DISCORD_TOKEN` takes precedence
    pub discord_token: Option<String>,

    pub database_path: PathBuf,

    /// Feed polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Delivery records older than this are purged.
    pub retention_days: u64,

    pub discord_api_base: String,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,

    /// In-fetch retries for 429/5xx feed responses.
    pub fetch_retries: u32,

    /// Destinations served concurrently per article.
    pub delivery_concurrency: usize,

    /// Links remembered per feed for new-item detection.
    pub seen_capacity: usize,

    /// Hours between retention sweeps while running.
    pub retention_sweep_hours: u64,

    pub user_agent: String,

    /// Per-language feed URL overrides.
    pub feeds: BTreeMap<Language, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: None,
            database_path: default_config_dir()
                .map(|dir| dir.join("relay.db"))
                .unwrap_or_else(|| PathBuf::from("relay.db")),
            poll_interval_ms: 300_000,
            retention_days: crate::storage::DEFAULT_RETENTION.as_secs() / (24 * 60 * 60),
            discord_api_base: crate::sender::DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
            fetch_retries: 2,
            delivery_concurrency: crate::delivery::DEFAULT_CONCURRENCY,
            seen_capacity: crate::feed::poller::DEFAULT_SEEN_CAPACITY,
            retention_sweep_hours: 24,
            user_agent: concat!("feedrelay/", env!("CARGO_PKG_VERSION")).to_string(),
            feeds: BTreeMap::new(),
        }
    }
}

/// SEC-015: Mask discord_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "discord_token",
                &self.discord_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("database_path", &self.database_path)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("retention_days", &self.retention_days)
            .field("discord_api_base", &self.discord_api_base)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("fetch_retries", &self.fetch_retries)
            .field("delivery_concurrency", &self.delivery_concurrency)
            .field("seen_capacity", &self.seen_capacity)
            .field("retention_sweep_hours", &self.retention_sweep_hours)
            .field("user_agent", &self.user_agent)
            .field("feeds", &self.feeds)
            .finish()
    }
}

/// `~/.config/feedrelay`, if `HOME` is set.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join("feedrelay"))
}

/// `$FEEDRELAY_CONFIG`, else `~/.config/feedrelay/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .or_else(|| default_config_dir().map(|dir| dir.join("config.toml")))
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 12] = [
        "discord_token",
        "database_path",
        "poll_interval_ms",
        "retention_days",
        "discord_api_base",
        "request_timeout_secs",
        "fetch_retries",
        "delivery_concurrency",
        "seen_capacity",
        "retention_sweep_hours",
        "user_agent",
        "feeds",
    ];

    /// Loads the file, applies the process environment and validates.
    pub fn from_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Overrides file values with environment variables read via `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(TOKEN_ENV) {
            self.discord_token = Some(token);
        }
        if let Some(path) = get(DATABASE_PATH_ENV) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(value) = get(POLL_INTERVAL_ENV) {
            self.poll_interval_ms = parse_number(POLL_INTERVAL_ENV, &value)?;
        }
        if let Some(value) = get(RETENTION_DAYS_ENV) {
            self.retention_days = parse_number(RETENTION_DAYS_ENV, &value)?;
        }
        if let Some(base) = get(API_BASE_ENV) {
            self.discord_api_base = base;
        }
        Ok(())
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(())
            }
        };
        positive("poll_interval_ms", self.poll_interval_ms)?;
        positive("retention_days", self.retention_days)?;
        positive("request_timeout_secs", self.request_timeout_secs)?;
        positive("retention_sweep_hours", self.retention_sweep_hours)?;
        positive("delivery_concurrency", self.delivery_concurrency as u64)?;
        positive("seen_capacity", self.seen_capacity as u64)?;

        validate_http_url(&self.discord_api_base).map_err(|e| ConfigError::Invalid {
            key: "discord_api_base",
            reason: e.to_string(),
        })?;
        for url in self.feeds.values() {
            validate_http_url(url).map_err(|e| ConfigError::Invalid {
                key: "feeds",
                reason: format!("{url}: {e}"),
            })?;
        }
        Ok(())
    }

    /// The bot token, or [`ConfigError::Missing`] for commands that need it.
    pub fn require_token(&self) -> Result<SecretString, ConfigError> {
        self.discord_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.to_string()))
            .ok_or(ConfigError::Missing(TOKEN_ENV))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_hours.saturating_mul(60 * 60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The feed URL monitored for `language`.
    pub fn feed_url(&self, language: Language) -> &str {
        self.feeds
            .get(&language)
            .map(String::as_str)
            .unwrap_or_else(|| language.feed_url())
    }

    /// One source per supported language.
    pub fn feed_sources(&self) -> Vec<FeedSource> {
        Language::ALL
            .iter()
            .map(|&lang| FeedSource::new(lang, self.feed_url(lang)))
            .collect()
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.request_timeout(),
            max_retries: self.fetch_retries,
            ..FetchOptions::default()
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        let defaults = PollerConfig::default();
        PollerConfig {
            interval: self.poll_interval(),
            seen_capacity: std::num::NonZeroUsize::new(self.seen_capacity)
                .unwrap_or(defaults.seen_capacity),
            fetch: self.fetch_options(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("'{value}' is not a number"),
    })
}

// ============================================================================
// Tests
// ============================================================================

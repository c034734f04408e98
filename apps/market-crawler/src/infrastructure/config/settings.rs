//! Crawler Configuration Settings
//!
//! Connection tuning and crawl-target selection, loaded from
//! environment variables. Every tuning knob has a default; only the
//! crawl target itself is required.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::market::{Exchange, MarketType};
use crate::domain::message::ChannelType;

/// Connection tuning shared by every venue connection.
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    /// Interval between outbound keepalives.
    pub heartbeat_interval: Duration,
    /// Silence tolerated after a keepalive before the connection is
    /// considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Backoff multiplier applied per failed attempt.
    pub reconnect_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Pause between subscription command frames. Zero sends them
    /// back to back.
    pub subscribe_stagger: Duration,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(64),
            reconnect_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
            subscribe_stagger: Duration::ZERO,
        }
    }
}

impl CrawlerSettings {
    /// Load settings from environment variables, falling back to
    /// defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            heartbeat_interval: parse_env_duration_secs(
                "CRAWLER_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "CRAWLER_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "CRAWLER_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "CRAWLER_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_multiplier: parse_env_f64(
                "CRAWLER_RECONNECT_MULTIPLIER",
                defaults.reconnect_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "CRAWLER_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            subscribe_stagger: parse_env_duration_millis(
                "CRAWLER_SUBSCRIBE_STAGGER_MS",
                defaults.subscribe_stagger,
            ),
        }
    }
}

/// What to crawl: venue, market type, channels, pairs, markets file.
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    /// The venue to crawl.
    pub exchange: Exchange,
    /// The market type to crawl.
    pub market_type: MarketType,
    /// Channel types to subscribe.
    pub channel_types: Vec<ChannelType>,
    /// Canonical pairs. Empty means every listed pair.
    pub pairs: Vec<String>,
    /// Path to the JSON market metadata file.
    pub markets_file: PathBuf,
}

impl CrawlTarget {
    /// Load the crawl target from environment variables.
    ///
    /// `CRAWLER_EXCHANGE`, `CRAWLER_MARKET_TYPE`, `CRAWLER_CHANNELS`,
    /// and `CRAWLER_MARKETS_FILE` are required; `CRAWLER_PAIRS` is a
    /// comma-separated list and defaults to every listed pair.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let exchange = require_env("CRAWLER_EXCHANGE")?
            .parse::<Exchange>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CRAWLER_EXCHANGE".to_string(),
                reason: e.to_string(),
            })?;

        let market_type = require_env("CRAWLER_MARKET_TYPE")?
            .parse::<MarketType>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CRAWLER_MARKET_TYPE".to_string(),
                reason: e.to_string(),
            })?;

        let channel_types = require_env("CRAWLER_CHANNELS")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<ChannelType>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "CRAWLER_CHANNELS".to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if channel_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CRAWLER_CHANNELS".to_string(),
                reason: "no channel types given".to_string(),
            });
        }

        let pairs = std::env::var("CRAWLER_PAIRS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let markets_file = PathBuf::from(require_env("CRAWLER_MARKETS_FILE")?);

        Ok(Self {
            exchange,
            market_type,
            channel_types,
            pairs,
            markets_file,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable holds an unparseable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// The variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

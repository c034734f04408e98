//! Port Traits
//!
//! Boundaries between the orchestration core and the outside world:
//! where markets come from (`MarketDirectory`), where normalized
//! messages go (`MessageSink`), and how each venue speaks
//! (`VenueAdapter`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::market::{Exchange, Market, MarketRegistry, MarketType};
use crate::domain::message::{ChannelError, ChannelType, Msg};
use crate::domain::orderbook::OrderBookTracker;
use crate::domain::quantity::QuantityError;

// =============================================================================
// Market Directory
// =============================================================================

/// Errors from loading market metadata.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The markets file could not be read.
    #[error("failed to read markets file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The markets file was not valid JSON.
    #[error("failed to parse markets file: {0}")]
    Parse(#[from] serde_json::Error),

    /// No markets matched the requested venue and market type.
    #[error("no {market_type} markets found for {exchange}")]
    Empty {
        /// The venue.
        exchange: Exchange,
        /// The requested market type.
        market_type: MarketType,
    },
}

/// Source of market metadata (symbols, precisions, contract values).
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    /// Fetch all markets for one venue and market type.
    ///
    /// # Errors
    ///
    /// Fails when the underlying source is unreachable or yields no
    /// markets for the combination.
    async fn fetch_markets(
        &self,
        exchange: Exchange,
        market_type: MarketType,
    ) -> Result<Vec<Market>, DirectoryError>;
}

/// Directory backed by a preloaded market list.
///
/// Production deployments refresh this from venue REST endpoints out of
/// band; the crawler itself only reads.
#[derive(Debug, Default)]
pub struct StaticMarketDirectory {
    markets: Vec<Market>,
}

impl StaticMarketDirectory {
    /// Directory over an in-memory market list.
    #[must_use]
    pub fn new(markets: Vec<Market>) -> Self {
        Self { markets }
    }

    /// Load a directory from a JSON file holding an array of markets.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, DirectoryError> {
        let text = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let markets: Vec<Market> = serde_json::from_str(&text)?;
        Ok(Self::new(markets))
    }
}

#[async_trait]
impl MarketDirectory for StaticMarketDirectory {
    async fn fetch_markets(
        &self,
        exchange: Exchange,
        market_type: MarketType,
    ) -> Result<Vec<Market>, DirectoryError> {
        let matched: Vec<Market> = self
            .markets
            .iter()
            .filter(|m| m.exchange == exchange && m.market_type == market_type)
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(DirectoryError::Empty {
                exchange,
                market_type,
            });
        }
        Ok(matched)
    }
}

// =============================================================================
// Message Sink
// =============================================================================

/// Lifecycle and fault events surfaced alongside the message stream.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// A connection reached the venue and subscribed.
    Connected {
        /// The venue.
        exchange: Exchange,
    },
    /// A connection dropped.
    Disconnected {
        /// The venue.
        exchange: Exchange,
    },
    /// A reconnect attempt is about to start.
    Reconnecting {
        /// The venue.
        exchange: Exchange,
        /// 1-based attempt counter since the last healthy session.
        attempt: u32,
    },
    /// The venue sent a frame that violated its own protocol. The
    /// affected book has been reset and will resync on the next
    /// snapshot; the stream itself continues.
    ProtocolViolation {
        /// The venue.
        exchange: Exchange,
        /// Venue-native symbol, when attributable.
        raw_pair: String,
        /// Human-readable description.
        detail: String,
    },
}

/// Downstream consumer of normalized messages.
///
/// `on_message` is awaited inline by the connection task, so a slow sink
/// applies backpressure to the socket read loop.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Receive one normalized message.
    async fn on_message(&self, msg: Msg);

    /// Receive one lifecycle event. Defaults to a structured log line.
    async fn on_event(&self, event: CrawlEvent) {
        tracing::info!(?event, "crawl event");
    }
}

// =============================================================================
// Venue Adapter
// =============================================================================

/// How frames arrive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Text or uncompressed binary frames.
    Plain,
    /// Binary frames carrying a gzip stream.
    Gzip,
    /// Binary frames carrying a raw deflate stream (no zlib header).
    Deflate,
}

/// Keepalive scheme a venue expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatSpec {
    /// Send WebSocket protocol ping frames.
    WsPing,
    /// Send an application-level text frame on the interval.
    AppPing {
        /// Exact payload to send.
        payload: String,
    },
    /// The venue pings first; the adapter answers in `decode`.
    ServerInitiated,
}

/// Static connection parameters for one venue.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    /// WebSocket endpoint.
    pub url: String,
    /// Compression applied to incoming frames.
    pub frame: FrameKind,
    /// Keepalive scheme.
    pub heartbeat: HeartbeatSpec,
    /// Max raw channels one connection may carry. Zero means unlimited.
    pub max_channels_per_connection: usize,
}

/// Per-connection state handed to `decode`.
pub struct DecodeContext<'a> {
    /// Market type this connection serves.
    pub market_type: MarketType,
    /// Markets for the venue and market type.
    pub registry: &'a MarketRegistry,
    /// Id-keyed L2 state, reset on every reconnect.
    pub tracker: &'a mut OrderBookTracker,
}

/// Outcome of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Normalized messages to forward downstream.
    Messages(Vec<Msg>),
    /// A text frame to send back to the venue (server-initiated pings).
    Reply(String),
    /// Control noise with no downstream effect.
    Skip,
}

/// Errors from decoding one frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame's channel could not be mapped.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A quantity could not be converted.
    #[error(transparent)]
    Quantity(#[from] QuantityError),

    /// An expected field was absent or had the wrong shape.
    #[error("frame missing field `{0}`")]
    MissingField(&'static str),

    /// The venue broke its own protocol (diverged book state, malformed
    /// sequencing). Surfaced as a `ProtocolViolation` event.
    #[error("protocol violation on {raw_pair}: {detail}")]
    Protocol {
        /// Venue-native symbol, when attributable.
        raw_pair: String,
        /// Human-readable description.
        detail: String,
    },
}

/// Everything venue-specific: endpoints, channel naming, subscription
/// grammar, and frame decoding. One implementation per venue; all are
/// stateless, with per-connection state living in `DecodeContext`.
pub trait VenueAdapter: Send + Sync {
    /// The venue this adapter speaks for.
    fn exchange(&self) -> Exchange;

    /// Static connection parameters.
    fn connection(&self, market_type: MarketType) -> ConnectionProfile;

    /// Map one canonical pair and channel type to raw channel strings.
    ///
    /// Usually one string; kline channels may fan out to one per period.
    ///
    /// # Errors
    ///
    /// Fails when the venue does not carry the channel type on this
    /// market type, or the pair is not listed.
    fn to_raw_channels(
        &self,
        market_type: MarketType,
        channel_type: ChannelType,
        pair: &str,
        registry: &MarketRegistry,
    ) -> Result<Vec<String>, ChannelError>;

    /// Recover the logical channel type from a raw channel string.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a channel this adapter produces.
    fn from_raw_channel(&self, raw_channel: &str) -> Result<ChannelType, ChannelError>;

    /// Render subscription command frames for a batch of raw channels.
    fn subscribe_commands(
        &self,
        market_type: MarketType,
        raw_channels: &[String],
        registry: &MarketRegistry,
    ) -> Vec<String>;

    /// Decode one decompressed text frame into normalized messages.
    ///
    /// # Errors
    ///
    /// Malformed or unmappable frames fail without affecting the
    /// connection; `Protocol` errors additionally raise an event.
    fn decode(&self, ctx: &mut DecodeContext<'_>, frame: &str) -> Result<Decoded, DecodeError>;
}

/// Group raw channels by a key, preserving first-seen key order.
///
/// Subscription grammars that batch channels per stream name use this
/// to keep command frames deterministic.
#[must_use]
pub fn group_channels<F>(raw_channels: &[String], key_of: F) -> Vec<(String, Vec<String>)>
where
    F: Fn(&str) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for channel in raw_channels {
        let key = key_of(channel);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(channel.clone());
    }
    order
        .into_iter()
        .map(|key| {
            let members = groups.remove(&key).unwrap_or_default();
            (key, members)
        })
        .collect()
}

/// Shared handle type for adapters.
pub type AdapterHandle = Arc<dyn VenueAdapter>;

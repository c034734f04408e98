//! Crawl Orchestration
//!
//! `crawl` is the single entrypoint: resolve markets, map the requested
//! pairs and channel types onto raw venue channels, shard them across
//! connections, and run one `ConnectionManager` per shard until
//! cancellation.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::ports::{
    AdapterHandle, DirectoryError, MarketDirectory, MessageSink, VenueAdapter,
};
use crate::domain::market::{Exchange, MarketRegistry, MarketType};
use crate::domain::message::{ChannelError, ChannelType};
use crate::infrastructure::config::CrawlerSettings;
use crate::infrastructure::connection::ConnectionManager;
use crate::infrastructure::venues::adapter_for;

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

// =============================================================================
// Request
// =============================================================================

/// One crawl: a venue, a market type, channel types, and pairs.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// The venue to crawl.
    pub exchange: Exchange,
    /// The market type to crawl.
    pub market_type: MarketType,
    /// Channel types to subscribe.
    pub channel_types: Vec<ChannelType>,
    /// Canonical pairs. Empty means every pair the venue lists.
    pub pairs: Vec<String>,
}

/// Errors that abort a crawl before any connection is made.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Market metadata could not be loaded.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A requested pair or channel type cannot be mapped on this venue.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The request resolved to zero raw channels.
    #[error("crawl request resolved to no channels")]
    NoChannels,
}

// =============================================================================
// Planning
// =============================================================================

/// Map every requested pair and channel type to raw channels.
///
/// # Errors
///
/// Fails on the first unmappable combination. Unsupported channel types
/// are a configuration fault and abort the whole crawl rather than
/// silently thinning the subscription set.
pub fn plan_channels(
    adapter: &dyn VenueAdapter,
    market_type: MarketType,
    channel_types: &[ChannelType],
    pairs: &[String],
    registry: &MarketRegistry,
) -> Result<Vec<String>, ChannelError> {
    let mut raw_channels = Vec::new();
    for channel_type in channel_types {
        for pair in pairs {
            raw_channels.extend(adapter.to_raw_channels(
                market_type,
                *channel_type,
                pair,
                registry,
            )?);
        }
    }
    Ok(raw_channels)
}

/// Split raw channels into per-connection shards.
///
/// `max` of zero means one connection carries everything.
#[must_use]
pub fn shard_channels(raw_channels: Vec<String>, max: usize) -> Vec<Vec<String>> {
    if raw_channels.is_empty() {
        return Vec::new();
    }
    if max == 0 {
        return vec![raw_channels];
    }
    raw_channels
        .chunks(max)
        .map(<[String]>::to_vec)
        .collect()
}

// =============================================================================
// Entry Point
// =============================================================================

/// Run one crawl until `cancel` fires.
///
/// Connections reconnect internally; this function only returns early
/// when planning fails.
///
/// # Errors
///
/// Fails when market metadata cannot be loaded or the request maps to
/// no valid channels.
pub async fn crawl(
    request: CrawlRequest,
    directory: Arc<dyn MarketDirectory>,
    sink: Arc<dyn MessageSink>,
    settings: CrawlerSettings,
    cancel: CancellationToken,
) -> Result<(), CrawlError> {
    let adapter: AdapterHandle = adapter_for(request.exchange);

    let markets =
        fetch_markets_with_retry(directory.as_ref(), request.exchange, request.market_type)
            .await?;
    let registry = Arc::new(MarketRegistry::new(markets));

    let pairs: Vec<String> = if request.pairs.is_empty() {
        registry.pairs().to_vec()
    } else {
        request.pairs.clone()
    };

    let raw_channels = plan_channels(
        adapter.as_ref(),
        request.market_type,
        &request.channel_types,
        &pairs,
        &registry,
    )?;
    if raw_channels.is_empty() {
        return Err(CrawlError::NoChannels);
    }

    let profile = adapter.connection(request.market_type);
    let shards = shard_channels(raw_channels, profile.max_channels_per_connection);

    info!(
        exchange = %request.exchange,
        market_type = %request.market_type,
        pairs = pairs.len(),
        connections = shards.len(),
        "starting crawl"
    );

    let mut tasks = JoinSet::new();
    for shard in shards {
        let manager = ConnectionManager::new(
            Arc::clone(&adapter),
            request.market_type,
            Arc::clone(&registry),
            shard,
            Arc::clone(&sink),
            settings.clone(),
            cancel.clone(),
        );
        tasks.spawn(async move {
            if let Err(err) = manager.run().await {
                warn!(error = %err, "connection gave up");
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            warn!(error = %err, "connection task panicked");
        }
    }

    Ok(())
}

async fn fetch_markets_with_retry(
    directory: &dyn MarketDirectory,
    exchange: Exchange,
    market_type: MarketType,
) -> Result<Vec<crate::domain::market::Market>, DirectoryError> {
    let mut last_err = None;
    for attempt in 1..=FETCH_ATTEMPTS {
        match directory.fetch_markets(exchange, market_type).await {
            Ok(markets) => return Ok(markets),
            Err(err) => {
                warn!(
                    %exchange,
                    %market_type,
                    attempt,
                    error = %err,
                    "market fetch failed"
                );
                last_err = Some(err);
                if attempt < FETCH_ATTEMPTS {
                    tokio::time::sleep(FETCH_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or(DirectoryError::Empty {
        exchange,
        market_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        ConnectionProfile, DecodeContext, Decoded, DecodeError, FrameKind, HeartbeatSpec,
    };

    struct FakeAdapter;

    impl VenueAdapter for FakeAdapter {
        fn exchange(&self) -> Exchange {
            Exchange::Kraken
        }

        fn connection(&self, _market_type: MarketType) -> ConnectionProfile {
            ConnectionProfile {
                url: "wss://example.invalid".to_string(),
                frame: FrameKind::Plain,
                heartbeat: HeartbeatSpec::WsPing,
                max_channels_per_connection: 2,
            }
        }

        fn to_raw_channels(
            &self,
            _market_type: MarketType,
            channel_type: ChannelType,
            pair: &str,
            _registry: &MarketRegistry,
        ) -> Result<Vec<String>, ChannelError> {
            match channel_type {
                ChannelType::Trade => Ok(vec![format!("trade:{pair}")]),
                ChannelType::Kline => Ok(vec![
                    format!("kline:1m:{pair}"),
                    format!("kline:1h:{pair}"),
                ]),
                other => Err(ChannelError::Unsupported {
                    exchange: Exchange::Kraken,
                    market_type: MarketType::Spot,
                    channel_type: other,
                }),
            }
        }

        fn from_raw_channel(&self, _raw_channel: &str) -> Result<ChannelType, ChannelError> {
            Ok(ChannelType::Trade)
        }

        fn subscribe_commands(
            &self,
            _market_type: MarketType,
            _raw_channels: &[String],
            _registry: &MarketRegistry,
        ) -> Vec<String> {
            Vec::new()
        }

        fn decode(
            &self,
            _ctx: &mut DecodeContext<'_>,
            _frame: &str,
        ) -> Result<Decoded, DecodeError> {
            Ok(Decoded::Skip)
        }
    }

    #[test]
    fn plan_flattens_fanout_channels() {
        let registry = MarketRegistry::new(Vec::new());
        let pairs = vec!["BTC_USD".to_string()];
        let channels = plan_channels(
            &FakeAdapter,
            MarketType::Spot,
            &[ChannelType::Trade, ChannelType::Kline],
            &pairs,
            &registry,
        )
        .unwrap();
        assert_eq!(
            channels,
            vec!["trade:BTC_USD", "kline:1m:BTC_USD", "kline:1h:BTC_USD"]
        );
    }

    #[test]
    fn plan_fails_fast_on_unsupported_channel() {
        let registry = MarketRegistry::new(Vec::new());
        let pairs = vec!["BTC_USD".to_string()];
        let err = plan_channels(
            &FakeAdapter,
            MarketType::Spot,
            &[ChannelType::FundingRate],
            &pairs,
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported { .. }));
    }

    #[test]
    fn shard_respects_connection_limit() {
        let channels: Vec<String> = (0..5).map(|i| format!("c{i}")).collect();
        let shards = shard_channels(channels, 2);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0], vec!["c0", "c1"]);
        assert_eq!(shards[2], vec!["c4"]);
    }

    #[test]
    fn shard_zero_means_single_connection() {
        let channels: Vec<String> = (0..5).map(|i| format!("c{i}")).collect();
        let shards = shard_channels(channels, 0);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 5);
    }

    #[test]
    fn shard_empty_input_yields_no_connections() {
        assert!(shard_channels(Vec::new(), 2).is_empty());
    }
}

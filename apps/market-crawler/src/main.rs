//! Market Crawler Binary
//!
//! Crawls one venue and market type, printing normalized messages as
//! JSON lines on stdout.
//!
//! # Usage
//!
//! ```bash
//! CRAWLER_EXCHANGE=kraken \
//! CRAWLER_MARKET_TYPE=spot \
//! CRAWLER_CHANNELS=Trade,OrderBook \
//! CRAWLER_PAIRS=BTC_USD \
//! CRAWLER_MARKETS_FILE=markets.json \
//! cargo run --bin market-crawler
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `CRAWLER_EXCHANGE`: binance | huobi | okx | bitmex | kraken
//! - `CRAWLER_MARKET_TYPE`: spot | swap | futures
//! - `CRAWLER_CHANNELS`: Comma-separated channel types
//! - `CRAWLER_MARKETS_FILE`: JSON market metadata file
//!
//! ## Optional
//! - `CRAWLER_PAIRS`: Comma-separated pairs (default: all listed)
//! - `CRAWLER_HEARTBEAT_INTERVAL_SECS`: Keepalive interval (default: 30)
//! - `CRAWLER_HEARTBEAT_TIMEOUT_SECS`: Keepalive timeout (default: 5)
//! - `CRAWLER_RECONNECT_DELAY_INITIAL_MS`: First reconnect delay (default: 1000)
//! - `CRAWLER_RECONNECT_DELAY_MAX_SECS`: Reconnect delay cap (default: 64)
//! - `CRAWLER_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `CRAWLER_SUBSCRIBE_STAGGER_MS`: Pause between subscribe frames (default: 0)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use async_trait::async_trait;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use market_crawler::infrastructure::telemetry;
use market_crawler::{
    CrawlEvent, CrawlRequest, CrawlTarget, CrawlerSettings, MessageSink, Msg,
    StaticMarketDirectory, crawl,
};

/// Sink that prints every message as one JSON line.
struct StdoutSink;

#[async_trait]
impl MessageSink for StdoutSink {
    async fn on_message(&self, msg: Msg) {
        match serde_json::to_string(&msg) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize message"),
        }
    }

    async fn on_event(&self, event: CrawlEvent) {
        tracing::info!(?event, "crawl event");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init();

    let target = CrawlTarget::from_env()?;
    let settings = CrawlerSettings::from_env();
    tracing::info!(
        exchange = %target.exchange,
        market_type = %target.market_type,
        channels = ?target.channel_types,
        "starting market crawler"
    );

    let directory = Arc::new(StaticMarketDirectory::from_json_file(&target.markets_file)?);

    let request = CrawlRequest {
        exchange: target.exchange,
        market_type: target.market_type,
        channel_types: target.channel_types,
        pairs: target.pairs,
    };

    let cancel = CancellationToken::new();
    let crawl_task = tokio::spawn(crawl(
        request,
        directory,
        Arc::new(StdoutSink),
        settings,
        cancel.clone(),
    ));

    await_shutdown().await;
    cancel.cancel();
    crawl_task.await??;

    tracing::info!("market crawler stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

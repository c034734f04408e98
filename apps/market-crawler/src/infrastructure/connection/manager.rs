//! Connection Manager
//!
//! Owns one WebSocket session to one venue: connect, subscribe, decode
//! frames through the venue adapter, keep the connection alive, and
//! reconnect with backoff when it drops. Order-book tracking state is
//! rebuilt from scratch on every reconnect; level ids never survive a
//! session.

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::application::ports::{
    AdapterHandle, CrawlEvent, DecodeContext, DecodeError, Decoded, HeartbeatSpec, MessageSink,
};
use crate::domain::market::{MarketRegistry, MarketType};
use crate::domain::orderbook::OrderBookTracker;
use crate::infrastructure::config::CrawlerSettings;
use crate::infrastructure::connection::{Backoff, FrameCodec, HeartbeatClock, TransportError};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Errors that drop a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// A binary frame could not be decompressed or decoded.
    #[error(transparent)]
    Frame(#[from] TransportError),

    /// The venue stopped answering keepalives.
    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    /// The venue closed the connection.
    #[error("connection closed by venue")]
    RemoteClosed,

    /// Reconnection attempts are exhausted.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

/// One venue connection carrying a fixed set of raw channels.
pub struct ConnectionManager {
    adapter: AdapterHandle,
    market_type: MarketType,
    registry: Arc<MarketRegistry>,
    raw_channels: Vec<String>,
    sink: Arc<dyn MessageSink>,
    settings: CrawlerSettings,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Manager for one shard of raw channels.
    #[must_use]
    pub fn new(
        adapter: AdapterHandle,
        market_type: MarketType,
        registry: Arc<MarketRegistry>,
        raw_channels: Vec<String>,
        sink: Arc<dyn MessageSink>,
        settings: CrawlerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            market_type,
            registry,
            raw_channels,
            sink,
            settings,
            cancel,
        }
    }

    /// Run the connection until cancellation or exhausted reconnects.
    ///
    /// # Errors
    ///
    /// Fails only when reconnection attempts run out; all transport
    /// faults are retried internally.
    pub async fn run(self) -> Result<(), ConnectionError> {
        let exchange = self.adapter.exchange();
        let mut backoff = Backoff::new(&self.settings);

        loop {
            if self.cancel.is_cancelled() {
                info!(%exchange, "connection cancelled");
                return Ok(());
            }

            match self.connect_and_stream(&mut backoff).await {
                Ok(()) => {
                    info!(%exchange, "connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    warn!(%exchange, error = %e, "connection dropped");
                    self.sink
                        .on_event(CrawlEvent::Disconnected { exchange })
                        .await;

                    let Some(delay) = backoff.next_delay() else {
                        return Err(ConnectionError::MaxReconnectAttemptsExceeded);
                    };
                    let attempt = backoff.attempt();
                    info!(%exchange, attempt, delay_ms = delay.as_millis(), "reconnecting");
                    self.sink
                        .on_event(CrawlEvent::Reconnecting { exchange, attempt })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One session: connect, subscribe, stream until a fault.
    async fn connect_and_stream(&self, backoff: &mut Backoff) -> Result<(), ConnectionError> {
        let exchange = self.adapter.exchange();
        let profile = self.adapter.connection(self.market_type);
        info!(%exchange, url = %profile.url, channels = self.raw_channels.len(), "connecting");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&profile.url).await?;
        let (mut write, mut read) = ws_stream.split();

        self.subscribe(&mut write).await?;
        self.sink.on_event(CrawlEvent::Connected { exchange }).await;
        backoff.reset();

        let codec = FrameCodec::new(profile.frame);
        let clock = HeartbeatClock::new(self.settings.heartbeat_timeout);
        let mut tracker = OrderBookTracker::new();

        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + self.settings.heartbeat_interval,
            self.settings.heartbeat_interval,
        );
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }

                _ = keepalive.tick() => {
                    self.check_and_ping(&profile.heartbeat, &clock, &mut write).await?;
                }

                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Err(ConnectionError::RemoteClosed);
                    };
                    match frame? {
                        Message::Text(text) => {
                            clock.record_activity();
                            self.handle_frame(&mut write, &mut tracker, text.as_str()).await?;
                        }
                        Message::Binary(payload) => {
                            clock.record_activity();
                            let text = codec.decode(&payload)?;
                            self.handle_frame(&mut write, &mut tracker, &text).await?;
                        }
                        Message::Ping(data) => {
                            clock.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Message::Pong(_) => clock.record_activity(),
                        Message::Close(_) => return Err(ConnectionError::RemoteClosed),
                        Message::Frame(_) => {}
                    }
                }
            }
        }
    }

    /// Send subscription commands, optionally staggered.
    async fn subscribe(&self, write: &mut WsWriter) -> Result<(), ConnectionError> {
        let commands =
            self.adapter
                .subscribe_commands(self.market_type, &self.raw_channels, &self.registry);
        for command in commands {
            debug!(exchange = %self.adapter.exchange(), %command, "subscribing");
            write.send(Message::Text(command.into())).await?;
            if !self.settings.subscribe_stagger.is_zero() {
                tokio::time::sleep(self.settings.subscribe_stagger).await;
            }
        }
        Ok(())
    }

    /// Expiry check plus one keepalive, per the venue's scheme.
    async fn check_and_ping(
        &self,
        heartbeat: &HeartbeatSpec,
        clock: &HeartbeatClock,
        write: &mut WsWriter,
    ) -> Result<(), ConnectionError> {
        match heartbeat {
            HeartbeatSpec::WsPing => {
                if clock.is_expired() {
                    return Err(ConnectionError::HeartbeatTimeout);
                }
                write.send(Message::Ping(Vec::new().into())).await?;
                clock.mark_ping_sent();
            }
            HeartbeatSpec::AppPing { payload } => {
                if clock.is_expired() {
                    return Err(ConnectionError::HeartbeatTimeout);
                }
                write.send(Message::Text(payload.clone().into())).await?;
                clock.mark_ping_sent();
            }
            HeartbeatSpec::ServerInitiated => {
                // The venue pings first; judge on raw silence.
                let bound = self.settings.heartbeat_interval + self.settings.heartbeat_timeout;
                if clock.idle_for() > bound {
                    return Err(ConnectionError::HeartbeatTimeout);
                }
            }
        }
        Ok(())
    }

    /// Decode one text frame and route its outcome.
    async fn handle_frame(
        &self,
        write: &mut WsWriter,
        tracker: &mut OrderBookTracker,
        frame: &str,
    ) -> Result<(), ConnectionError> {
        let mut ctx = DecodeContext {
            market_type: self.market_type,
            registry: &self.registry,
            tracker,
        };
        match self.adapter.decode(&mut ctx, frame) {
            Ok(Decoded::Messages(msgs)) => {
                for msg in msgs {
                    self.sink.on_message(msg).await;
                }
            }
            Ok(Decoded::Reply(reply)) => {
                write.send(Message::Text(reply.into())).await?;
            }
            Ok(Decoded::Skip) => {
                trace!(exchange = %self.adapter.exchange(), "control frame skipped");
            }
            Err(DecodeError::Protocol { raw_pair, detail }) => {
                warn!(
                    exchange = %self.adapter.exchange(),
                    %raw_pair,
                    %detail,
                    "protocol violation, awaiting resync"
                );
                self.sink
                    .on_event(CrawlEvent::ProtocolViolation {
                        exchange: self.adapter.exchange(),
                        raw_pair,
                        detail,
                    })
                    .await;
            }
            Err(e) => {
                // Malformed frames are dropped; the stream outlives them.
                warn!(exchange = %self.adapter.exchange(), error = %e, "undecodable frame dropped");
            }
        }
        Ok(())
    }
}

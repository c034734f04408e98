#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Crawler - Multi-Venue Market Data Normalizer
//!
//! Maintains WebSocket connections to cryptocurrency exchanges and
//! normalizes their public market data (order books, trades, BBO,
//! tickers, candles, funding rates) into one canonical schema.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Venue-independent types and logic
//!   - `market`: Exchanges, market types, the market registry
//!   - `message`: Canonical message schema and channel types
//!   - `orderbook`: Id-keyed L2 order-book state tracking
//!   - `quantity`: Contract-to-base-currency conversion
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market directory, message sink, venue adapter traits
//!   - `services`: Crawl planning and orchestration
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `connection`: WebSocket transport, heartbeats, reconnection
//!   - `venues`: One protocol adapter per exchange
//!   - `config`: Environment-variable configuration
//!   - `telemetry`: Structured logging setup
//!
//! # Data Flow
//!
//! ```text
//! Venue WS ──► FrameCodec ──► VenueAdapter::decode ──► Msg ──► MessageSink
//!                  │                  │
//!              gzip/deflate     OrderBookTracker
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Venue-independent types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{Exchange, Market, MarketRegistry, MarketType};
pub use domain::message::{
    BboMsg, ChannelError, ChannelType, FundingRateMsg, KlineMsg, Msg, MsgEnvelope, OrderBookMsg,
    OrderItem, TickerMsg, TradeMsg, derive_bbo,
};
pub use domain::orderbook::{AppliedLevel, BookAction, BookError, LevelUpdate, OrderBookTracker};
pub use domain::quantity::{QuantityError, base_quantity};

// Ports (for integration tests and embedders)
pub use application::ports::{
    AdapterHandle, ConnectionProfile, CrawlEvent, DecodeContext, DecodeError, Decoded,
    DirectoryError, FrameKind, HeartbeatSpec, MarketDirectory, MessageSink,
    StaticMarketDirectory, VenueAdapter,
};
pub use application::services::{CrawlError, CrawlRequest, crawl};

// Infrastructure
pub use infrastructure::config::{ConfigError, CrawlTarget, CrawlerSettings};
pub use infrastructure::connection::{ConnectionError, ConnectionManager};
pub use infrastructure::telemetry::init as init_telemetry;
pub use infrastructure::venues::adapter_for;

//! Canonical Message Schema
//!
//! Every venue frame is normalized into one of the `Msg` variants below.
//! All variants share the `MsgEnvelope` header; the original payload is
//! retained in `raw` for audit.
//!
//! Side convention: `true` means sell/ask, `false` means buy/bid,
//! uniformly across venues regardless of how the wire encodes it.

use serde::{Deserialize, Serialize};

use crate::domain::market::{Exchange, MarketType};

// =============================================================================
// Channel Type
// =============================================================================

/// Logical channel kinds a subscription can request.
///
/// Not every venue supports every kind; an unsupported combination is a
/// configuration error raised at channel-mapping time, never at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Best bid and offer (top of book).
    Bbo,
    /// Order-book snapshots and incremental deltas.
    OrderBook,
    /// Individual trades.
    Trade,
    /// 24h rolling ticker.
    Ticker,
    /// OHLC candles.
    Kline,
    /// Perpetual-swap funding rate.
    FundingRate,
}

impl ChannelType {
    /// All channel types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Bbo,
            Self::OrderBook,
            Self::Trade,
            Self::Ticker,
            Self::Kline,
            Self::FundingRate,
        ]
    }

    /// Canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bbo => "BBO",
            Self::OrderBook => "OrderBook",
            Self::Trade => "Trade",
            Self::Ticker => "Ticker",
            Self::Kline => "Kline",
            Self::FundingRate => "FundingRate",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelType {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bbo" => Ok(Self::Bbo),
            "orderbook" => Ok(Self::OrderBook),
            "trade" => Ok(Self::Trade),
            "ticker" => Ok(Self::Ticker),
            "kline" => Ok(Self::Kline),
            "fundingrate" | "funding_rate" => Ok(Self::FundingRate),
            _ => Err(ChannelError::Unknown(s.to_string())),
        }
    }
}

// =============================================================================
// Channel Mapping Errors
// =============================================================================

/// Errors from mapping between logical channel types and raw channels.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// The venue has no raw channel for this type/market combination.
    /// Configuration-time, fatal to that subscription only.
    #[error("{exchange} does not support {channel_type} on {market_type} markets")]
    Unsupported {
        /// The venue.
        exchange: Exchange,
        /// The requested market type.
        market_type: MarketType,
        /// The requested channel type.
        channel_type: ChannelType,
    },

    /// An incoming raw channel string was not recognized.
    /// Per-frame: logged and dropped, never fatal to the stream.
    #[error("unknown channel: {0}")]
    Unknown(String),

    /// The requested pair is not listed on the venue's market type.
    #[error("{exchange} {market_type} market does not list pair {pair}")]
    UnknownPair {
        /// The venue.
        exchange: Exchange,
        /// The requested market type.
        market_type: MarketType,
        /// The canonical pair.
        pair: String,
    },
}

// =============================================================================
// Envelope
// =============================================================================

/// Header shared by every canonical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgEnvelope {
    /// Source venue.
    pub exchange: Exchange,
    /// Market type of the instrument.
    pub market_type: MarketType,
    /// Canonical pair (`BASE_QUOTE`).
    pub pair: String,
    /// Venue-native symbol.
    pub raw_pair: String,
    /// Raw channel string the frame arrived on.
    pub channel: String,
    /// Logical channel type.
    pub channel_type: ChannelType,
    /// Venue event time, epoch milliseconds.
    pub timestamp_ms: i64,
    /// Original payload, retained for audit.
    pub raw: String,
}

// =============================================================================
// Message Variants
// =============================================================================

/// One price level of an order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Price level.
    pub price: f64,
    /// Base-currency quantity at that level.
    pub quantity: f64,
    /// Notional cost, `price * quantity`.
    pub cost: f64,
    /// Level timestamp, when the venue provides one.
    pub timestamp_ms: Option<i64>,
}

impl OrderItem {
    /// Build a level, computing its cost.
    #[must_use]
    pub fn new(price: f64, quantity: f64) -> Self {
        Self {
            price,
            quantity,
            cost: price * quantity,
            timestamp_ms: None,
        }
    }

    /// Build a level with a venue-supplied timestamp.
    #[must_use]
    pub fn with_timestamp(price: f64, quantity: f64, timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            ..Self::new(price, quantity)
        }
    }
}

/// Order-book snapshot or incremental delta.
///
/// `asks` ascend by price, `bids` descend. For deltas (`full == false`)
/// the side arrays hold only the touched levels; callers that need a
/// complete in-memory book must accumulate state themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookMsg {
    /// Shared header.
    pub envelope: MsgEnvelope,
    /// Ask levels, ascending by price.
    pub asks: Vec<OrderItem>,
    /// Bid levels, descending by price.
    pub bids: Vec<OrderItem>,
    /// `true` when this message fully replaces prior book state.
    pub full: bool,
}

/// Best bid and offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BboMsg {
    /// Shared header.
    pub envelope: MsgEnvelope,
    /// Best bid price.
    pub bid_price: f64,
    /// Quantity at the best bid.
    pub bid_quantity: f64,
    /// Best ask price.
    pub ask_price: f64,
    /// Quantity at the best ask.
    pub ask_quantity: f64,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMsg {
    /// Shared header.
    pub envelope: MsgEnvelope,
    /// Execution price.
    pub price: f64,
    /// Base-currency quantity.
    pub quantity: f64,
    /// `true` = sell/ask, `false` = buy/bid.
    pub side: bool,
    /// Venue-assigned trade id.
    pub trade_id: String,
}

/// 24h rolling ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMsg {
    /// Shared header.
    pub envelope: MsgEnvelope,
    /// 24h open.
    pub open: f64,
    /// 24h high.
    pub high: f64,
    /// 24h low.
    pub low: f64,
    /// Last traded price.
    pub last: f64,
    /// 24h base-currency volume.
    pub volume: f64,
    /// 24h quote-currency volume, when published.
    pub quote_volume: Option<f64>,
    /// Best bid price, when published.
    pub best_bid_price: Option<f64>,
    /// Quantity at the best bid, when published.
    pub best_bid_quantity: Option<f64>,
    /// Best ask price, when published.
    pub best_ask_price: Option<f64>,
    /// Quantity at the best ask, when published.
    pub best_ask_quantity: Option<f64>,
}

/// One OHLC candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineMsg {
    /// Shared header.
    pub envelope: MsgEnvelope,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Base-currency volume.
    pub volume: f64,
    /// Candle period in the venue's own notation (e.g. `1m`, `1H`).
    pub period: String,
}

/// Perpetual-swap funding rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRateMsg {
    /// Shared header.
    pub envelope: MsgEnvelope,
    /// Current funding rate.
    pub funding_rate: f64,
    /// Next funding settlement time, epoch milliseconds.
    pub funding_time_ms: i64,
}

/// Canonical message delivered to the downstream sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    /// Order-book snapshot or delta.
    OrderBook(OrderBookMsg),
    /// Best bid and offer.
    Bbo(BboMsg),
    /// Executed trade.
    Trade(TradeMsg),
    /// 24h ticker.
    Ticker(TickerMsg),
    /// OHLC candle.
    Kline(KlineMsg),
    /// Funding rate.
    FundingRate(FundingRateMsg),
}

impl Msg {
    /// Shared header of any variant.
    #[must_use]
    pub const fn envelope(&self) -> &MsgEnvelope {
        match self {
            Self::OrderBook(m) => &m.envelope,
            Self::Bbo(m) => &m.envelope,
            Self::Trade(m) => &m.envelope,
            Self::Ticker(m) => &m.envelope,
            Self::Kline(m) => &m.envelope,
            Self::FundingRate(m) => &m.envelope,
        }
    }
}

// =============================================================================
// BBO Derivation
// =============================================================================

/// Errors from deriving a BBO out of an order-book message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BboError {
    /// Only full snapshots carry a trustworthy top of book.
    #[error("cannot derive BBO from an incremental order book message")]
    NotFull,
    /// A side of the snapshot was empty.
    #[error("cannot derive BBO: {0} side is empty")]
    EmptySide(&'static str),
}

/// Derive a `BboMsg` from the top levels of a full snapshot.
///
/// Used by venues that publish no dedicated BBO channel. Never applied
/// to incremental deltas: a delta's first level is not the top of book.
///
/// # Errors
///
/// Fails when the message is not a full snapshot or either side is empty.
pub fn derive_bbo(book: &OrderBookMsg) -> Result<BboMsg, BboError> {
    if !book.full {
        return Err(BboError::NotFull);
    }
    let best_bid = book.bids.first().ok_or(BboError::EmptySide("bid"))?;
    let best_ask = book.asks.first().ok_or(BboError::EmptySide("ask"))?;

    let mut envelope = book.envelope.clone();
    envelope.channel_type = ChannelType::Bbo;

    Ok(BboMsg {
        envelope,
        bid_price: best_bid.price,
        bid_quantity: best_bid.quantity,
        ask_price: best_ask.price,
        ask_quantity: best_ask.quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(channel_type: ChannelType) -> MsgEnvelope {
        MsgEnvelope {
            exchange: Exchange::Kraken,
            market_type: MarketType::Spot,
            pair: "BTC_USD".to_string(),
            raw_pair: "XBT/USD".to_string(),
            channel: "book".to_string(),
            channel_type,
            timestamp_ms: 1_700_000_000_000,
            raw: String::new(),
        }
    }

    fn snapshot(full: bool, bids: Vec<OrderItem>, asks: Vec<OrderItem>) -> OrderBookMsg {
        OrderBookMsg {
            envelope: envelope(ChannelType::OrderBook),
            asks,
            bids,
            full,
        }
    }

    #[test]
    fn order_item_cost() {
        let item = OrderItem::new(100.0, 2.5);
        assert!((item.cost - 250.0).abs() < f64::EPSILON);
        assert!(item.timestamp_ms.is_none());
    }

    #[test]
    fn derive_bbo_from_full_snapshot() {
        let book = snapshot(
            true,
            vec![OrderItem::new(100.0, 2.0)],
            vec![OrderItem::new(101.0, 3.0)],
        );

        let bbo = derive_bbo(&book).unwrap();
        assert!((bbo.bid_price - 100.0).abs() < f64::EPSILON);
        assert!((bbo.bid_quantity - 2.0).abs() < f64::EPSILON);
        assert!((bbo.ask_price - 101.0).abs() < f64::EPSILON);
        assert!((bbo.ask_quantity - 3.0).abs() < f64::EPSILON);
        assert_eq!(bbo.envelope.channel_type, ChannelType::Bbo);
    }

    #[test]
    fn derive_bbo_rejects_incremental() {
        let book = snapshot(
            false,
            vec![OrderItem::new(100.0, 2.0)],
            vec![OrderItem::new(101.0, 3.0)],
        );
        assert_eq!(derive_bbo(&book).unwrap_err(), BboError::NotFull);
    }

    #[test]
    fn derive_bbo_rejects_empty_side() {
        let book = snapshot(true, vec![], vec![OrderItem::new(101.0, 3.0)]);
        assert_eq!(derive_bbo(&book).unwrap_err(), BboError::EmptySide("bid"));

        let book = snapshot(true, vec![OrderItem::new(100.0, 2.0)], vec![]);
        assert_eq!(derive_bbo(&book).unwrap_err(), BboError::EmptySide("ask"));
    }

    #[test]
    fn channel_type_parsing() {
        assert_eq!("BBO".parse::<ChannelType>().unwrap(), ChannelType::Bbo);
        assert_eq!(
            "funding_rate".parse::<ChannelType>().unwrap(),
            ChannelType::FundingRate
        );
        assert!("level3".parse::<ChannelType>().is_err());
    }

    #[test]
    fn msg_envelope_accessor() {
        let msg = Msg::Bbo(BboMsg {
            envelope: envelope(ChannelType::Bbo),
            bid_price: 1.0,
            bid_quantity: 1.0,
            ask_price: 2.0,
            ask_quantity: 1.0,
        });
        assert_eq!(msg.envelope().exchange, Exchange::Kraken);
        assert_eq!(msg.envelope().channel_type, ChannelType::Bbo);
    }
}

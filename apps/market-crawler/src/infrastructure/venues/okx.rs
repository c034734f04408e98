//! OKX Adapter
//!
//! Spot, swap, and futures markets over the v3 WebSocket API. Frames
//! arrive as raw-deflate binary payloads; the transport layer hands
//! this adapter inflated JSON text.
//!
//! Channels are `<market_type>/<name>:<instrument_id>`, e.g.
//! `swap/trade:BTC-USD-SWAP`. Data frames carry a `table` like
//! `swap/trade` plus a `data` array. There is no dedicated BBO
//! channel; `depth5` snapshots are folded down to top of book.
//!
//! Contract sizes are reported in contracts and converted to base
//! currency using each market's contract value.

use serde_json::Value;
use tracing::warn;

use crate::application::ports::{
    ConnectionProfile, DecodeContext, DecodeError, Decoded, FrameKind, HeartbeatSpec, VenueAdapter,
};
use crate::domain::market::{Exchange, Market, MarketRegistry, MarketType};
use crate::domain::message::{
    ChannelError, ChannelType, FundingRateMsg, KlineMsg, Msg, OrderBookMsg, OrderItem, TickerMsg,
    TradeMsg, derive_bbo,
};
use crate::domain::quantity::base_quantity;

use super::util::{envelope, field_array, field_f64, field_str, iso_millis, json_f64, market_of, now_millis};

const WEBSOCKET_URL: &str = "wss://real.okex.com:8443/ws/v3";

/// Candle period suffixes in seconds, with their display names.
const PERIODS: &[(u32, &str)] = &[
    (60, "1m"),
    (180, "3m"),
    (300, "5m"),
    (900, "15m"),
    (1800, "30m"),
    (3600, "1H"),
    (7200, "2H"),
    (14400, "4H"),
    (21600, "6H"),
    (43200, "12H"),
    (86400, "1D"),
    (604800, "1W"),
];

/// OKX spot, swap, and futures markets.
pub struct OkxAdapter;

impl OkxAdapter {
    fn market_prefix(market_type: MarketType) -> &'static str {
        match market_type {
            MarketType::Spot => "spot",
            MarketType::Swap => "swap",
            MarketType::Futures => "futures",
        }
    }

    fn period_name(table: &str) -> Option<&'static str> {
        let secs: u32 = table
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok()?;
        PERIODS
            .iter()
            .find(|(s, _)| *s == secs)
            .map(|(_, name)| *name)
    }

    fn item_timestamp(item: &Value) -> i64 {
        item.get("timestamp")
            .and_then(Value::as_str)
            .and_then(iso_millis)
            .unwrap_or_else(now_millis)
    }

    /// Parse one `[price, size, n]` level, converting contracts to
    /// base quantity.
    fn parse_level(market: &Market, level: &Value) -> Result<OrderItem, DecodeError> {
        let price = level
            .get(0)
            .and_then(json_f64)
            .ok_or(DecodeError::MissingField("price"))?;
        let size = level
            .get(1)
            .and_then(json_f64)
            .ok_or(DecodeError::MissingField("size"))?;
        let quantity = base_quantity(market, size, price)?;
        Ok(OrderItem::new(price, quantity))
    }

    fn parse_book(
        table: &str,
        item: &Value,
        raw: &str,
        market: &Market,
        full: bool,
    ) -> Result<OrderBookMsg, DecodeError> {
        let parse_side = |key: &'static str| -> Result<Vec<OrderItem>, DecodeError> {
            field_array(item, key)?
                .iter()
                .map(|level| Self::parse_level(market, level))
                .collect()
        };
        Ok(OrderBookMsg {
            envelope: envelope(
                market,
                table,
                ChannelType::OrderBook,
                Self::item_timestamp(item),
                raw,
            ),
            asks: parse_side("asks")?,
            bids: parse_side("bids")?,
            full,
        })
    }

    fn decode_trades(
        table: &str,
        data: &[Value],
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        data.iter()
            .map(|item| {
                let market = market_of(ctx.registry, field_str(item, "instrument_id")?)?;
                let price = field_f64(item, "price")?;
                // Futures report trade size in the qty field.
                let size_key = if ctx.market_type == MarketType::Futures {
                    "qty"
                } else {
                    "size"
                };
                let size = field_f64(item, size_key)?;
                Ok(Msg::Trade(TradeMsg {
                    envelope: envelope(
                        market,
                        table,
                        ChannelType::Trade,
                        Self::item_timestamp(item),
                        raw,
                    ),
                    price,
                    quantity: base_quantity(market, size, price)?,
                    side: field_str(item, "side")? == "sell",
                    trade_id: field_str(item, "trade_id")?.to_string(),
                }))
            })
            .collect()
    }

    fn decode_tickers(
        table: &str,
        data: &[Value],
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        data.iter()
            .map(|item| {
                let market = market_of(ctx.registry, field_str(item, "instrument_id")?)?;
                Ok(Msg::Ticker(TickerMsg {
                    envelope: envelope(
                        market,
                        table,
                        ChannelType::Ticker,
                        Self::item_timestamp(item),
                        raw,
                    ),
                    open: field_f64(item, "open_24h")?,
                    high: field_f64(item, "high_24h")?,
                    low: field_f64(item, "low_24h")?,
                    last: field_f64(item, "last")?,
                    volume: field_f64(item, "base_volume_24h")?,
                    quote_volume: item.get("quote_volume_24h").and_then(json_f64),
                    best_bid_price: item.get("best_bid").and_then(json_f64),
                    best_bid_quantity: item.get("best_bid_size").and_then(json_f64),
                    best_ask_price: item.get("best_ask").and_then(json_f64),
                    best_ask_quantity: item.get("best_ask_size").and_then(json_f64),
                }))
            })
            .collect()
    }

    fn decode_klines(
        table: &str,
        data: &[Value],
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        let period = Self::period_name(table).ok_or(DecodeError::MissingField("period"))?;
        data.iter()
            .map(|item| {
                let market = market_of(ctx.registry, field_str(item, "instrument_id")?)?;
                let candle = field_array(item, "candle")?;
                if candle.len() < 6 {
                    return Err(DecodeError::MissingField("candle"));
                }
                let num = |i: usize, key: &'static str| -> Result<f64, DecodeError> {
                    candle
                        .get(i)
                        .and_then(json_f64)
                        .ok_or(DecodeError::MissingField(key))
                };
                let timestamp_ms = candle
                    .first()
                    .and_then(Value::as_str)
                    .and_then(iso_millis)
                    .unwrap_or_else(now_millis);
                // Derivative candles carry base volume in a seventh
                // currency_volume element.
                let volume = if candle.len() >= 7 {
                    num(6, "currency_volume")?
                } else {
                    num(5, "volume")?
                };
                Ok(Msg::Kline(KlineMsg {
                    envelope: envelope(market, table, ChannelType::Kline, timestamp_ms, raw),
                    open: num(1, "open")?,
                    high: num(2, "high")?,
                    low: num(3, "low")?,
                    close: num(4, "close")?,
                    volume,
                    period: period.to_string(),
                }))
            })
            .collect()
    }

    fn decode_funding_rates(
        table: &str,
        data: &[Value],
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        data.iter()
            .map(|item| {
                let market = market_of(ctx.registry, field_str(item, "instrument_id")?)?;
                let funding_time_ms = item
                    .get("funding_time")
                    .and_then(Value::as_str)
                    .and_then(iso_millis)
                    .ok_or(DecodeError::MissingField("funding_time"))?;
                Ok(Msg::FundingRate(FundingRateMsg {
                    envelope: envelope(
                        market,
                        table,
                        ChannelType::FundingRate,
                        now_millis(),
                        raw,
                    ),
                    funding_rate: field_f64(item, "funding_rate")?,
                    funding_time_ms,
                }))
            })
            .collect()
    }
}

impl VenueAdapter for OkxAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Okx
    }

    fn connection(&self, _market_type: MarketType) -> ConnectionProfile {
        ConnectionProfile {
            url: WEBSOCKET_URL.to_string(),
            frame: FrameKind::Deflate,
            heartbeat: HeartbeatSpec::AppPing {
                payload: "ping".to_string(),
            },
            max_channels_per_connection: 0,
        }
    }

    fn to_raw_channels(
        &self,
        market_type: MarketType,
        channel_type: ChannelType,
        pair: &str,
        registry: &MarketRegistry,
    ) -> Result<Vec<String>, ChannelError> {
        if channel_type == ChannelType::FundingRate && market_type != MarketType::Swap {
            return Err(ChannelError::Unsupported {
                exchange: Exchange::Okx,
                market_type,
                channel_type,
            });
        }
        let markets = registry.by_pair(pair);
        if markets.is_empty() {
            return Err(ChannelError::UnknownPair {
                exchange: Exchange::Okx,
                market_type,
                pair: pair.to_string(),
            });
        }

        let prefix = Self::market_prefix(market_type);
        let mut channels = Vec::new();
        // Futures list several expiries per pair; subscribe them all.
        for market in markets {
            let raw = &market.raw_id;
            match channel_type {
                ChannelType::Bbo => channels.push(format!("{prefix}/depth5:{raw}")),
                ChannelType::OrderBook => channels.push(format!("{prefix}/optimized_depth:{raw}")),
                ChannelType::Trade => channels.push(format!("{prefix}/trade:{raw}")),
                ChannelType::Ticker => channels.push(format!("{prefix}/ticker:{raw}")),
                ChannelType::FundingRate => channels.push(format!("{prefix}/funding_rate:{raw}")),
                ChannelType::Kline => channels.extend(
                    PERIODS
                        .iter()
                        .map(|(secs, _)| format!("{prefix}/candle{secs}s:{raw}")),
                ),
            }
        }
        Ok(channels)
    }

    fn from_raw_channel(&self, raw_channel: &str) -> Result<ChannelType, ChannelError> {
        let name = raw_channel
            .split('/')
            .nth(1)
            .map(|rest| rest.split(':').next().unwrap_or(rest))
            .ok_or_else(|| ChannelError::Unknown(raw_channel.to_string()))?;
        if name.starts_with("candle") {
            return Ok(ChannelType::Kline);
        }
        match name {
            "depth5" => Ok(ChannelType::Bbo),
            "depth" | "depth_l2_tbt" | "optimized_depth" => Ok(ChannelType::OrderBook),
            "trade" => Ok(ChannelType::Trade),
            "ticker" => Ok(ChannelType::Ticker),
            "funding_rate" => Ok(ChannelType::FundingRate),
            _ => Err(ChannelError::Unknown(raw_channel.to_string())),
        }
    }

    fn subscribe_commands(
        &self,
        _market_type: MarketType,
        raw_channels: &[String],
        _registry: &MarketRegistry,
    ) -> Vec<String> {
        vec![
            serde_json::json!({ "op": "subscribe", "args": raw_channels }).to_string(),
        ]
    }

    fn decode(&self, ctx: &mut DecodeContext<'_>, frame: &str) -> Result<Decoded, DecodeError> {
        if frame == "pong" {
            return Ok(Decoded::Skip);
        }
        let obj: Value = serde_json::from_str(frame)?;

        if let Some(event) = obj.get("event").and_then(Value::as_str) {
            if event == "error" {
                warn!(%frame, "okx subscription error");
            }
            return Ok(Decoded::Skip);
        }
        let (Some(table), Some(data)) = (
            obj.get("table").and_then(Value::as_str),
            obj.get("data").and_then(Value::as_array),
        ) else {
            return Ok(Decoded::Skip);
        };

        let msgs = match self.from_raw_channel(table)? {
            ChannelType::Bbo => {
                // depth5 snapshots fold down to top of book.
                let mut msgs = Vec::new();
                for item in data {
                    let market =
                        market_of(ctx.registry, field_str(item, "instrument_id")?)?.clone();
                    let book = Self::parse_book(table, item, frame, &market, true)?;
                    match derive_bbo(&book) {
                        Ok(bbo) => msgs.push(Msg::Bbo(bbo)),
                        Err(e) => warn!(raw_pair = %market.raw_id, error = %e, "depth5 frame unusable"),
                    }
                }
                msgs
            }
            ChannelType::OrderBook => {
                let full = obj.get("action").and_then(Value::as_str) == Some("partial");
                let mut msgs = Vec::new();
                for item in data {
                    let market =
                        market_of(ctx.registry, field_str(item, "instrument_id")?)?.clone();
                    msgs.push(Msg::OrderBook(Self::parse_book(
                        table, item, frame, &market, full,
                    )?));
                }
                msgs
            }
            ChannelType::Trade => Self::decode_trades(table, data, frame, ctx)?,
            ChannelType::Ticker => Self::decode_tickers(table, data, frame, ctx)?,
            ChannelType::Kline => Self::decode_klines(table, data, frame, ctx)?,
            ChannelType::FundingRate => Self::decode_funding_rates(table, data, frame, ctx)?,
        };
        Ok(Decoded::Messages(msgs))
    }
}

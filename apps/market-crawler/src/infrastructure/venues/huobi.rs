//! Huobi Adapter
//!
//! Spot markets. Every frame is a gzip-compressed binary payload; the
//! transport layer hands this adapter decompressed JSON text.
//!
//! Channel naming is dotted: `market.<raw_pair>.bbo`,
//! `market.<raw_pair>.depth.step0` (full snapshots),
//! `market.<raw_pair>.trade.detail`, `market.<raw_pair>.detail`
//! (24h ticker), and `market.<raw_pair>.kline.<period>`.
//!
//! Huobi pings first: `{"ping":N}` must be answered with `{"pong":N}`
//! or the venue drops the connection after a few seconds.

use serde_json::Value;

use crate::application::ports::{
    ConnectionProfile, DecodeContext, DecodeError, Decoded, FrameKind, HeartbeatSpec, VenueAdapter,
};
use crate::domain::market::{Exchange, Market, MarketRegistry, MarketType};
use crate::domain::message::{
    BboMsg, ChannelError, ChannelType, KlineMsg, Msg, OrderBookMsg, OrderItem, TickerMsg, TradeMsg,
};

use super::util::{envelope, field_array, field_f64, field_i64, json_f64, market_of};

const WEBSOCKET_URL: &str = "wss://api.huobi.pro/ws";

const KLINE_PERIODS: &[&str] = &[
    "1min", "5min", "15min", "30min", "60min", "4hour", "1day", "1week",
];

/// Huobi spot markets.
pub struct HuobiAdapter;

impl HuobiAdapter {
    fn decode_bbo(
        channel: &str,
        ts: i64,
        tick: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Msg, DecodeError> {
        Ok(Msg::Bbo(BboMsg {
            envelope: envelope(market, channel, ChannelType::Bbo, ts, raw),
            bid_price: field_f64(tick, "bid")?,
            bid_quantity: field_f64(tick, "bidSize")?,
            ask_price: field_f64(tick, "ask")?,
            ask_quantity: field_f64(tick, "askSize")?,
        }))
    }

    fn decode_order_book(
        channel: &str,
        ts: i64,
        tick: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Msg, DecodeError> {
        let parse_side = |key: &'static str| -> Result<Vec<OrderItem>, DecodeError> {
            field_array(tick, key)?
                .iter()
                .map(|level| {
                    let price = level
                        .get(0)
                        .and_then(json_f64)
                        .ok_or(DecodeError::MissingField(key))?;
                    let quantity = level
                        .get(1)
                        .and_then(json_f64)
                        .ok_or(DecodeError::MissingField(key))?;
                    Ok(OrderItem::new(price, quantity))
                })
                .collect()
        };

        Ok(Msg::OrderBook(OrderBookMsg {
            envelope: envelope(market, channel, ChannelType::OrderBook, ts, raw),
            asks: parse_side("asks")?,
            bids: parse_side("bids")?,
            // step0 depth is always a complete snapshot.
            full: true,
        }))
    }

    fn decode_trades(
        channel: &str,
        tick: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Vec<Msg>, DecodeError> {
        field_array(tick, "data")?
            .iter()
            .map(|t| {
                let direction = t
                    .get("direction")
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::MissingField("direction"))?;
                let trade_id = t
                    .get("tradeId")
                    .or_else(|| t.get("id"))
                    .and_then(Value::as_u64)
                    .ok_or(DecodeError::MissingField("tradeId"))?;
                Ok(Msg::Trade(TradeMsg {
                    envelope: envelope(
                        market,
                        channel,
                        ChannelType::Trade,
                        field_i64(t, "ts")?,
                        raw,
                    ),
                    price: field_f64(t, "price")?,
                    quantity: field_f64(t, "amount")?,
                    side: direction == "sell",
                    trade_id: trade_id.to_string(),
                }))
            })
            .collect()
    }

    fn decode_ticker(
        channel: &str,
        ts: i64,
        tick: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Msg, DecodeError> {
        Ok(Msg::Ticker(TickerMsg {
            envelope: envelope(market, channel, ChannelType::Ticker, ts, raw),
            open: field_f64(tick, "open")?,
            high: field_f64(tick, "high")?,
            low: field_f64(tick, "low")?,
            last: field_f64(tick, "close")?,
            // amount is base volume, vol is quote volume.
            volume: field_f64(tick, "amount")?,
            quote_volume: tick.get("vol").and_then(json_f64),
            best_bid_price: None,
            best_bid_quantity: None,
            best_ask_price: None,
            best_ask_quantity: None,
        }))
    }

    fn decode_kline(
        channel: &str,
        ts: i64,
        tick: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Msg, DecodeError> {
        let period = channel
            .split('.')
            .nth(3)
            .ok_or(DecodeError::MissingField("period"))?;
        Ok(Msg::Kline(KlineMsg {
            envelope: envelope(market, channel, ChannelType::Kline, ts, raw),
            open: field_f64(tick, "open")?,
            high: field_f64(tick, "high")?,
            low: field_f64(tick, "low")?,
            close: field_f64(tick, "close")?,
            volume: field_f64(tick, "amount")?,
            period: period.to_string(),
        }))
    }
}

impl VenueAdapter for HuobiAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Huobi
    }

    fn connection(&self, _market_type: MarketType) -> ConnectionProfile {
        ConnectionProfile {
            url: WEBSOCKET_URL.to_string(),
            frame: FrameKind::Gzip,
            heartbeat: HeartbeatSpec::ServerInitiated,
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
        if market_type != MarketType::Spot {
            return Err(ChannelError::Unsupported {
                exchange: Exchange::Huobi,
                market_type,
                channel_type,
            });
        }
        let markets = registry.by_pair(pair);
        if markets.is_empty() {
            return Err(ChannelError::UnknownPair {
                exchange: Exchange::Huobi,
                market_type,
                pair: pair.to_string(),
            });
        }

        let mut channels = Vec::new();
        for market in markets {
            let raw = market.raw_id.to_lowercase();
            match channel_type {
                ChannelType::Bbo => channels.push(format!("market.{raw}.bbo")),
                ChannelType::OrderBook => channels.push(format!("market.{raw}.depth.step0")),
                ChannelType::Trade => channels.push(format!("market.{raw}.trade.detail")),
                ChannelType::Ticker => channels.push(format!("market.{raw}.detail")),
                ChannelType::Kline => channels.extend(
                    KLINE_PERIODS
                        .iter()
                        .map(|period| format!("market.{raw}.kline.{period}")),
                ),
                ChannelType::FundingRate => {
                    return Err(ChannelError::Unsupported {
                        exchange: Exchange::Huobi,
                        market_type,
                        channel_type,
                    });
                }
            }
        }
        Ok(channels)
    }

    fn from_raw_channel(&self, raw_channel: &str) -> Result<ChannelType, ChannelError> {
        let mut parts = raw_channel.split('.');
        let (Some("market"), Some(_raw_pair), Some(kind)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ChannelError::Unknown(raw_channel.to_string()));
        };
        match kind {
            "bbo" => Ok(ChannelType::Bbo),
            "depth" => Ok(ChannelType::OrderBook),
            "trade" => Ok(ChannelType::Trade),
            "detail" => Ok(ChannelType::Ticker),
            "kline" => Ok(ChannelType::Kline),
            _ => Err(ChannelError::Unknown(raw_channel.to_string())),
        }
    }

    fn subscribe_commands(
        &self,
        _market_type: MarketType,
        raw_channels: &[String],
        _registry: &MarketRegistry,
    ) -> Vec<String> {
        raw_channels
            .iter()
            .map(|channel| {
                serde_json::json!({ "sub": channel, "id": "market-crawler" }).to_string()
            })
            .collect()
    }

    fn decode(&self, ctx: &mut DecodeContext<'_>, frame: &str) -> Result<Decoded, DecodeError> {
        let obj: Value = serde_json::from_str(frame)?;

        if let Some(ping) = obj.get("ping").and_then(Value::as_i64) {
            return Ok(Decoded::Reply(
                serde_json::json!({ "pong": ping }).to_string(),
            ));
        }

        let (Some(channel), Some(ts), Some(tick)) = (
            obj.get("ch").and_then(Value::as_str),
            obj.get("ts").and_then(Value::as_i64),
            obj.get("tick"),
        ) else {
            // Subscription acks carry "subbed"/"status" instead.
            return Ok(Decoded::Skip);
        };

        let raw_pair = channel
            .split('.')
            .nth(1)
            .ok_or(DecodeError::MissingField("ch"))?;
        let market = market_of(ctx.registry, raw_pair)?.clone();

        let msgs = match self.from_raw_channel(channel)? {
            ChannelType::Bbo => vec![Self::decode_bbo(channel, ts, tick, frame, &market)?],
            ChannelType::OrderBook => {
                vec![Self::decode_order_book(channel, ts, tick, frame, &market)?]
            }
            ChannelType::Trade => Self::decode_trades(channel, tick, frame, &market)?,
            ChannelType::Ticker => vec![Self::decode_ticker(channel, ts, tick, frame, &market)?],
            ChannelType::Kline => vec![Self::decode_kline(channel, ts, tick, frame, &market)?],
            ChannelType::FundingRate => return Ok(Decoded::Skip),
        };
        Ok(Decoded::Messages(msgs))
    }
}

//! Binance Adapter
//!
//! Spot markets over the combined-stream endpoint. Frames arrive as
//! `{"stream":"btcusdt@trade","data":{...}}`; subscriptions are sent as
//! `{"method":"SUBSCRIBE","params":[...],"id":1}` text frames so they
//! can be replayed verbatim after a reconnect.
//!
//! Channel naming: `<raw_pair_lowercase>@bookTicker` for BBO,
//! `@depth` for incremental order books, `@trade` for trades.

use serde_json::Value;

use crate::application::ports::{
    ConnectionProfile, DecodeContext, DecodeError, Decoded, FrameKind, HeartbeatSpec, VenueAdapter,
};
use crate::domain::market::{Exchange, MarketRegistry, MarketType};
use crate::domain::message::{
    BboMsg, ChannelError, ChannelType, Msg, OrderBookMsg, OrderItem, TradeMsg,
};

use super::util::{envelope, field_array, field_f64, field_i64, field_str, json_f64, market_of, now_millis};

const WEBSOCKET_URL: &str = "wss://stream.binance.com:9443/stream";

// Binance caps one connection at 1024 streams.
const MAX_CHANNELS: usize = 1024;

/// Binance spot markets.
pub struct BinanceAdapter;

impl BinanceAdapter {
    fn decode_bbo(channel: &str, data: &Value, raw: &str, ctx: &DecodeContext<'_>) -> Result<Msg, DecodeError> {
        let raw_pair = field_str(data, "s")?;
        let market = market_of(ctx.registry, raw_pair)?;
        Ok(Msg::Bbo(BboMsg {
            // bookTicker frames carry no event time.
            envelope: envelope(market, channel, ChannelType::Bbo, now_millis(), raw),
            bid_price: field_f64(data, "b")?,
            bid_quantity: field_f64(data, "B")?,
            ask_price: field_f64(data, "a")?,
            ask_quantity: field_f64(data, "A")?,
        }))
    }

    fn decode_order_book(
        channel: &str,
        data: &Value,
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Msg, DecodeError> {
        let raw_pair = field_str(data, "s")?;
        let market = market_of(ctx.registry, raw_pair)?;
        let timestamp_ms = field_i64(data, "E")?;

        let parse_side = |key: &'static str| -> Result<Vec<OrderItem>, DecodeError> {
            field_array(data, key)?
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
            envelope: envelope(market, channel, ChannelType::OrderBook, timestamp_ms, raw),
            asks: parse_side("a")?,
            bids: parse_side("b")?,
            full: false,
        }))
    }

    fn decode_trade(channel: &str, data: &Value, raw: &str, ctx: &DecodeContext<'_>) -> Result<Msg, DecodeError> {
        let raw_pair = field_str(data, "s")?;
        let market = market_of(ctx.registry, raw_pair)?;
        let timestamp_ms = field_i64(data, "T")?;
        let buyer_is_maker = data
            .get("m")
            .and_then(Value::as_bool)
            .ok_or(DecodeError::MissingField("m"))?;
        let trade_id = data
            .get("t")
            .and_then(Value::as_u64)
            .ok_or(DecodeError::MissingField("t"))?;

        Ok(Msg::Trade(TradeMsg {
            envelope: envelope(market, channel, ChannelType::Trade, timestamp_ms, raw),
            price: field_f64(data, "p")?,
            quantity: field_f64(data, "q")?,
            // Maker side is the resting side: buyer-maker means the
            // aggressor sold.
            side: buyer_is_maker,
            trade_id: trade_id.to_string(),
        }))
    }
}

impl VenueAdapter for BinanceAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn connection(&self, _market_type: MarketType) -> ConnectionProfile {
        ConnectionProfile {
            url: WEBSOCKET_URL.to_string(),
            frame: FrameKind::Plain,
            heartbeat: HeartbeatSpec::WsPing,
            max_channels_per_connection: MAX_CHANNELS,
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
                exchange: Exchange::Binance,
                market_type,
                channel_type,
            });
        }
        let suffix = match channel_type {
            ChannelType::Bbo => "bookTicker",
            ChannelType::OrderBook => "depth",
            ChannelType::Trade => "trade",
            _ => {
                return Err(ChannelError::Unsupported {
                    exchange: Exchange::Binance,
                    market_type,
                    channel_type,
                });
            }
        };
        let markets = registry.by_pair(pair);
        if markets.is_empty() {
            return Err(ChannelError::UnknownPair {
                exchange: Exchange::Binance,
                market_type,
                pair: pair.to_string(),
            });
        }
        Ok(markets
            .iter()
            .map(|m| format!("{}@{suffix}", m.raw_id.to_lowercase()))
            .collect())
    }

    fn from_raw_channel(&self, raw_channel: &str) -> Result<ChannelType, ChannelError> {
        match raw_channel.split('@').nth(1) {
            Some("bookTicker") => Ok(ChannelType::Bbo),
            Some("depth") => Ok(ChannelType::OrderBook),
            Some("trade") => Ok(ChannelType::Trade),
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
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": raw_channels,
                "id": 1,
            })
            .to_string(),
        ]
    }

    fn decode(&self, ctx: &mut DecodeContext<'_>, frame: &str) -> Result<Decoded, DecodeError> {
        let obj: Value = serde_json::from_str(frame)?;

        let (Some(stream), Some(data)) = (
            obj.get("stream").and_then(Value::as_str),
            obj.get("data"),
        ) else {
            // Subscription acks look like {"result":null,"id":1}.
            return Ok(Decoded::Skip);
        };

        let msg = match self.from_raw_channel(stream)? {
            ChannelType::Bbo => Self::decode_bbo(stream, data, frame, ctx)?,
            ChannelType::OrderBook => Self::decode_order_book(stream, data, frame, ctx)?,
            ChannelType::Trade => Self::decode_trade(stream, data, frame, ctx)?,
            // Unreachable: from_raw_channel only yields the three above.
            _ => return Ok(Decoded::Skip),
        };
        Ok(Decoded::Messages(vec![msg]))
    }
}

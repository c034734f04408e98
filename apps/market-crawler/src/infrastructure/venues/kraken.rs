//! Kraken Adapter
//!
//! Spot markets. Subscriptions are grouped per stream name:
//! `{"event":"subscribe","pair":[...],"subscription":{"name":"book"}}`.
//! Raw channels are encoded internally as `<name>:<raw_pair>` so a
//! channel string still identifies one subscription.
//!
//! Data frames are arrays: `[channelID, payload.., channelName, pair]`.
//! Book updates may carry separate ask and bid payload objects, so the
//! channel name and pair are read from the tail, not fixed positions.
//! Frames named `book-N` (N is the subscribed depth) all map to the
//! order-book channel.

use serde_json::Value;

use crate::application::ports::{
    ConnectionProfile, DecodeContext, DecodeError, Decoded, FrameKind, HeartbeatSpec,
    VenueAdapter, group_channels,
};
use crate::domain::market::{Exchange, Market, MarketRegistry, MarketType};
use crate::domain::message::{
    BboMsg, ChannelError, ChannelType, Msg, OrderBookMsg, OrderItem, TradeMsg,
};

use super::util::{envelope, json_f64, market_of, now_millis};

const WEBSOCKET_URL: &str = "wss://ws.kraken.com";

/// Kraken spot markets.
pub struct KrakenAdapter;

impl KrakenAdapter {
    fn seconds_to_millis(value: &Value) -> Option<i64> {
        #[allow(clippy::cast_possible_truncation)]
        json_f64(value).map(|secs| (secs * 1000.0).floor() as i64)
    }

    /// Parse a `[price, volume, time(, "r")]` book row.
    fn parse_book_row(row: &Value) -> Result<OrderItem, DecodeError> {
        let price = row
            .get(0)
            .and_then(json_f64)
            .ok_or(DecodeError::MissingField("price"))?;
        let volume = row
            .get(1)
            .and_then(json_f64)
            .ok_or(DecodeError::MissingField("volume"))?;
        let timestamp_ms = row
            .get(2)
            .and_then(Self::seconds_to_millis)
            .ok_or(DecodeError::MissingField("time"))?;
        Ok(OrderItem::with_timestamp(price, volume, timestamp_ms))
    }

    fn parse_book_side(payload: &Value, key: &str) -> Result<Vec<OrderItem>, DecodeError> {
        payload
            .get(key)
            .and_then(Value::as_array)
            .map_or_else(|| Ok(Vec::new()), |rows| {
                rows.iter().map(Self::parse_book_row).collect()
            })
    }

    fn decode_spread(
        channel: &str,
        payload: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Msg, DecodeError> {
        let num = |i: usize, key: &'static str| -> Result<f64, DecodeError> {
            payload
                .get(i)
                .and_then(json_f64)
                .ok_or(DecodeError::MissingField(key))
        };
        let timestamp_ms = payload
            .get(2)
            .and_then(Self::seconds_to_millis)
            .ok_or(DecodeError::MissingField("time"))?;
        Ok(Msg::Bbo(BboMsg {
            envelope: envelope(market, channel, ChannelType::Bbo, timestamp_ms, raw),
            bid_price: num(0, "bid")?,
            bid_quantity: num(3, "bidVolume")?,
            ask_price: num(1, "ask")?,
            ask_quantity: num(4, "askVolume")?,
        }))
    }

    fn decode_book(
        channel: &str,
        payloads: &[&Value],
        raw: &str,
        market: &Market,
    ) -> Result<Msg, DecodeError> {
        // Snapshots use as/bs keys, deltas a/b. A delta may split its
        // sides across two payload objects.
        let full = payloads.iter().any(|p| p.get("as").is_some());
        let mut asks = Vec::new();
        let mut bids = Vec::new();
        for payload in payloads {
            asks.extend(Self::parse_book_side(payload, if full { "as" } else { "a" })?);
            bids.extend(Self::parse_book_side(payload, if full { "bs" } else { "b" })?);
        }
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));

        Ok(Msg::OrderBook(OrderBookMsg {
            envelope: envelope(market, channel, ChannelType::OrderBook, now_millis(), raw),
            asks,
            bids,
            full,
        }))
    }

    fn decode_trades(
        channel: &str,
        payload: &Value,
        raw: &str,
        market: &Market,
    ) -> Result<Vec<Msg>, DecodeError> {
        payload
            .as_array()
            .ok_or(DecodeError::MissingField("trades"))?
            .iter()
            .map(|row| {
                let num = |i: usize, key: &'static str| -> Result<f64, DecodeError> {
                    row.get(i)
                        .and_then(json_f64)
                        .ok_or(DecodeError::MissingField(key))
                };
                let timestamp_ms = row
                    .get(2)
                    .and_then(Self::seconds_to_millis)
                    .ok_or(DecodeError::MissingField("time"))?;
                let side = row
                    .get(3)
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::MissingField("side"))?;
                Ok(Msg::Trade(TradeMsg {
                    envelope: envelope(market, channel, ChannelType::Trade, timestamp_ms, raw),
                    price: num(0, "price")?,
                    quantity: num(1, "volume")?,
                    side: side == "s",
                    // Kraken assigns no public trade ids.
                    trade_id: String::new(),
                }))
            })
            .collect()
    }
}

impl VenueAdapter for KrakenAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Kraken
    }

    fn connection(&self, _market_type: MarketType) -> ConnectionProfile {
        ConnectionProfile {
            url: WEBSOCKET_URL.to_string(),
            frame: FrameKind::Plain,
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
                exchange: Exchange::Kraken,
                market_type,
                channel_type,
            });
        }
        let name = match channel_type {
            ChannelType::Bbo => "spread",
            ChannelType::OrderBook => "book",
            ChannelType::Trade => "trade",
            _ => {
                return Err(ChannelError::Unsupported {
                    exchange: Exchange::Kraken,
                    market_type,
                    channel_type,
                });
            }
        };
        let markets = registry.by_pair(pair);
        if markets.is_empty() {
            return Err(ChannelError::UnknownPair {
                exchange: Exchange::Kraken,
                market_type,
                pair: pair.to_string(),
            });
        }
        Ok(markets
            .iter()
            .map(|m| format!("{name}:{}", m.raw_id))
            .collect())
    }

    fn from_raw_channel(&self, raw_channel: &str) -> Result<ChannelType, ChannelError> {
        let name = raw_channel.split(':').next().unwrap_or(raw_channel);
        if name.starts_with("book") {
            return Ok(ChannelType::OrderBook);
        }
        match name {
            "spread" => Ok(ChannelType::Bbo),
            "trade" => Ok(ChannelType::Trade),
            _ => Err(ChannelError::Unknown(raw_channel.to_string())),
        }
    }

    fn subscribe_commands(
        &self,
        _market_type: MarketType,
        raw_channels: &[String],
        _registry: &MarketRegistry,
    ) -> Vec<String> {
        // One command per stream name, all pairs batched.
        group_channels(raw_channels, |channel| {
            channel.split(':').next().unwrap_or(channel).to_string()
        })
        .into_iter()
        .map(|(name, members)| {
            let pairs: Vec<&str> = members
                .iter()
                .filter_map(|m| m.split(':').nth(1))
                .collect();
            serde_json::json!({
                "event": "subscribe",
                "pair": pairs,
                "subscription": { "name": name },
            })
            .to_string()
        })
        .collect()
    }

    fn decode(&self, ctx: &mut DecodeContext<'_>, frame: &str) -> Result<Decoded, DecodeError> {
        let obj: Value = serde_json::from_str(frame)?;

        if let Some(event) = obj.get("event").and_then(Value::as_str) {
            if event == "heartbeat" {
                return Ok(Decoded::Reply(
                    serde_json::json!({ "event": "ping", "reqid": 42 }).to_string(),
                ));
            }
            // pong, systemStatus, subscriptionStatus.
            return Ok(Decoded::Skip);
        }

        let Some(arr) = obj.as_array() else {
            return Ok(Decoded::Skip);
        };
        if arr.len() < 4 {
            return Err(DecodeError::MissingField("channel"));
        }
        let channel = arr[arr.len() - 2]
            .as_str()
            .ok_or(DecodeError::MissingField("channelName"))?;
        let raw_pair = arr[arr.len() - 1]
            .as_str()
            .ok_or(DecodeError::MissingField("pair"))?;
        let market = market_of(ctx.registry, raw_pair)?.clone();
        let payloads: Vec<&Value> = arr[1..arr.len() - 2].iter().collect();

        let msgs = match self.from_raw_channel(channel)? {
            ChannelType::Bbo => {
                let payload = payloads
                    .first()
                    .ok_or(DecodeError::MissingField("spread"))?;
                vec![Self::decode_spread(channel, payload, frame, &market)?]
            }
            ChannelType::OrderBook => {
                vec![Self::decode_book(channel, &payloads, frame, &market)?]
            }
            ChannelType::Trade => {
                let payload = payloads
                    .first()
                    .ok_or(DecodeError::MissingField("trades"))?;
                Self::decode_trades(channel, payload, frame, &market)?
            }
            _ => return Ok(Decoded::Skip),
        };
        Ok(Decoded::Messages(msgs))
    }
}

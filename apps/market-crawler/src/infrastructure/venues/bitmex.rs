//! BitMEX Adapter
//!
//! Swap and futures markets only. Subscriptions are `<table>:<symbol>`
//! args, e.g. `orderBookL2_25:XBTUSD`; data frames carry the bare table
//! name plus an `action` and a `data` array.
//!
//! The L2 book is keyed by opaque level ids whose update and delete
//! rows omit the price, so every frame runs through the per-connection
//! `OrderBookTracker`. A delete for an id the tracker never saw means
//! the local book diverged; the error surfaces as a protocol violation
//! and the book resyncs on the next partial.
//!
//! Sizes are contract counts and convert to base currency via each
//! market's contract value; trade quantities come directly from the
//! venue-computed `homeNotional`.

use serde_json::Value;

use crate::application::ports::{
    ConnectionProfile, DecodeContext, DecodeError, Decoded, FrameKind, HeartbeatSpec, VenueAdapter,
};
use crate::domain::market::{Exchange, Market, MarketRegistry, MarketType};
use crate::domain::message::{
    BboMsg, ChannelError, ChannelType, Msg, OrderBookMsg, OrderItem, TradeMsg,
};
use crate::domain::orderbook::{BookAction, BookError, LevelUpdate};
use crate::domain::quantity::base_quantity;

use super::util::{envelope, field_array, field_f64, field_str, iso_millis, market_of, now_millis};

const WEBSOCKET_URL: &str = "wss://www.bitmex.com/realtime";

/// BitMEX swap and futures markets.
pub struct BitmexAdapter;

impl BitmexAdapter {
    fn decode_quote(
        data: &[Value],
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        // The last element is the newest quote.
        let Some(item) = data.last() else {
            return Ok(Vec::new());
        };
        let market = market_of(ctx.registry, field_str(item, "symbol")?)?;
        let timestamp_ms = item
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(iso_millis)
            .unwrap_or_else(now_millis);

        let bid_price = field_f64(item, "bidPrice")?;
        let ask_price = field_f64(item, "askPrice")?;
        Ok(vec![Msg::Bbo(BboMsg {
            envelope: envelope(market, "quote", ChannelType::Bbo, timestamp_ms, raw),
            bid_price,
            bid_quantity: base_quantity(market, field_f64(item, "bidSize")?, bid_price)?,
            ask_price,
            ask_quantity: base_quantity(market, field_f64(item, "askSize")?, ask_price)?,
        })])
    }

    fn decode_book(
        data: &[Value],
        action: &str,
        raw: &str,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        let Some(first) = data.first() else {
            return Ok(Vec::new());
        };
        let raw_pair = field_str(first, "symbol")?.to_string();
        let market = market_of(ctx.registry, &raw_pair)?.clone();

        let book_action = match action {
            "partial" => BookAction::Partial,
            "insert" => BookAction::Insert,
            "update" => BookAction::Update,
            "delete" => BookAction::Delete,
            other => {
                return Err(DecodeError::Protocol {
                    raw_pair,
                    detail: format!("unknown orderBookL2 action {other}"),
                });
            }
        };

        let updates = data
            .iter()
            .map(|item| {
                let id = item
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or(DecodeError::MissingField("id"))?;
                Ok(LevelUpdate {
                    id,
                    side: field_str(item, "side")? == "Sell",
                    size: item.get("size").and_then(Value::as_f64).unwrap_or(0.0),
                    price: item.get("price").and_then(Value::as_f64),
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let applied = ctx
            .tracker
            .apply(&raw_pair, book_action, &updates)
            .map_err(|e| {
                let detail = match &e {
                    BookError::NotSynced { .. } => "delta before snapshot".to_string(),
                    BookError::UnknownId { id, .. } => format!("delete for untracked level {id}"),
                };
                DecodeError::Protocol {
                    raw_pair: raw_pair.clone(),
                    detail,
                }
            })?;

        let mut asks = Vec::new();
        let mut bids = Vec::new();
        for level in applied {
            let quantity = base_quantity(&market, level.size, level.price)?;
            let item = OrderItem::new(level.price, quantity);
            if level.side {
                asks.push(item);
            } else {
                bids.push(item);
            }
        }
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));

        Ok(vec![Msg::OrderBook(OrderBookMsg {
            envelope: envelope(
                &market,
                "orderBookL2_25",
                ChannelType::OrderBook,
                now_millis(),
                raw,
            ),
            asks,
            bids,
            full: book_action == BookAction::Partial,
        })])
    }

    fn decode_trades(
        data: &[Value],
        raw: &str,
        ctx: &DecodeContext<'_>,
    ) -> Result<Vec<Msg>, DecodeError> {
        data.iter()
            .map(|item| {
                let market = market_of(ctx.registry, field_str(item, "symbol")?)?;
                let timestamp_ms = item
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(iso_millis)
                    .unwrap_or_else(now_millis);
                Ok(Msg::Trade(TradeMsg {
                    envelope: envelope(market, "trade", ChannelType::Trade, timestamp_ms, raw),
                    price: field_f64(item, "price")?,
                    // homeNotional is already base currency.
                    quantity: field_f64(item, "homeNotional")?,
                    side: field_str(item, "side")? == "Sell",
                    trade_id: field_str(item, "trdMatchID")?.to_string(),
                }))
            })
            .collect()
    }
}

impl VenueAdapter for BitmexAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bitmex
    }

    fn connection(&self, _market_type: MarketType) -> ConnectionProfile {
        ConnectionProfile {
            url: WEBSOCKET_URL.to_string(),
            frame: FrameKind::Plain,
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
        if market_type == MarketType::Spot {
            return Err(ChannelError::Unsupported {
                exchange: Exchange::Bitmex,
                market_type,
                channel_type,
            });
        }
        let table = match channel_type {
            ChannelType::Bbo => "quote",
            ChannelType::OrderBook => "orderBookL2_25",
            ChannelType::Trade => "trade",
            _ => {
                return Err(ChannelError::Unsupported {
                    exchange: Exchange::Bitmex,
                    market_type,
                    channel_type,
                });
            }
        };
        let markets = registry.by_pair(pair);
        if markets.is_empty() {
            return Err(ChannelError::UnknownPair {
                exchange: Exchange::Bitmex,
                market_type,
                pair: pair.to_string(),
            });
        }
        Ok(markets
            .iter()
            .map(|m| format!("{table}:{}", m.raw_id))
            .collect())
    }

    fn from_raw_channel(&self, raw_channel: &str) -> Result<ChannelType, ChannelError> {
        match raw_channel.split(':').next() {
            Some("quote") => Ok(ChannelType::Bbo),
            Some("orderBookL2_25" | "orderBookL2") => Ok(ChannelType::OrderBook),
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
            serde_json::json!({ "op": "subscribe", "args": raw_channels }).to_string(),
        ]
    }

    fn decode(&self, ctx: &mut DecodeContext<'_>, frame: &str) -> Result<Decoded, DecodeError> {
        if frame == "pong" {
            return Ok(Decoded::Skip);
        }
        let obj: Value = serde_json::from_str(frame)?;
        let Some(table) = obj.get("table").and_then(Value::as_str) else {
            // Welcome banner and subscription acks carry no table.
            return Ok(Decoded::Skip);
        };
        let data = field_array(&obj, "data")?;

        let msgs = match self.from_raw_channel(table)? {
            ChannelType::Bbo => Self::decode_quote(data, frame, ctx)?,
            ChannelType::OrderBook => {
                let action = obj
                    .get("action")
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::MissingField("action"))?
                    .to_string();
                Self::decode_book(data, &action, frame, ctx)?
            }
            ChannelType::Trade => Self::decode_trades(data, frame, ctx)?,
            _ => return Ok(Decoded::Skip),
        };
        Ok(Decoded::Messages(msgs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook::OrderBookTracker;

    fn registry() -> MarketRegistry {
        MarketRegistry::new(vec![Market {
            exchange: Exchange::Bitmex,
            market_type: MarketType::Swap,
            pair: "BTC_USD".to_string(),
            raw_id: "XBTUSD".to_string(),
            base: "BTC".to_string(),
            quote: "USD".to_string(),
            contract_value: Some(1.0),
            price_precision: 1,
        }])
    }

    fn ctx_decode(tracker: &mut OrderBookTracker, frame: &str) -> Result<Decoded, DecodeError> {
        let registry = registry();
        let mut ctx = DecodeContext {
            market_type: MarketType::Swap,
            registry: &registry,
            tracker,
        };
        BitmexAdapter.decode(&mut ctx, frame)
    }

    #[test]
    fn spot_is_unsupported() {
        let err = BitmexAdapter
            .to_raw_channels(MarketType::Spot, ChannelType::Trade, "BTC_USD", &registry())
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported { .. }));
    }

    #[test]
    fn tableless_frames_are_skipped() {
        let mut tracker = OrderBookTracker::new();
        let frame = r#"{"info":"Welcome to the BitMEX Realtime API.","version":"2.0"}"#;
        assert_eq!(ctx_decode(&mut tracker, frame).unwrap(), Decoded::Skip);
        assert_eq!(ctx_decode(&mut tracker, "pong").unwrap(), Decoded::Skip);
    }

    #[test]
    fn quote_uses_newest_element() {
        let mut tracker = OrderBookTracker::new();
        let frame = r#"{"table":"quote","action":"insert","data":[{"timestamp":"2023-11-14T22:13:19.000Z","symbol":"XBTUSD","bidSize":100,"bidPrice":49999.0,"askPrice":50001.0,"askSize":200},{"timestamp":"2023-11-14T22:13:20.000Z","symbol":"XBTUSD","bidSize":300,"bidPrice":50000.0,"askPrice":50000.5,"askSize":400}]}"#;
        let Decoded::Messages(msgs) = ctx_decode(&mut tracker, frame).unwrap() else {
            panic!("expected messages");
        };
        assert_eq!(msgs.len(), 1);
        let Msg::Bbo(bbo) = &msgs[0] else {
            panic!("expected bbo");
        };
        assert!((bbo.bid_price - 50_000.0).abs() < 1e-9);
        // 300 one-dollar contracts at 50000.
        assert!((bbo.bid_quantity - 300.0 / 50_000.0).abs() < 1e-12);
        assert_eq!(bbo.envelope.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn book_keeps_both_sides_across_a_delta() {
        let mut tracker = OrderBookTracker::new();
        let partial = r#"{"table":"orderBookL2_25","action":"partial","data":[{"symbol":"XBTUSD","id":100,"side":"Sell","size":1000,"price":50001.0},{"symbol":"XBTUSD","id":101,"side":"Buy","size":2000,"price":49999.0}]}"#;
        let Decoded::Messages(msgs) = ctx_decode(&mut tracker, partial).unwrap() else {
            panic!("expected messages");
        };
        let Msg::OrderBook(book) = &msgs[0] else {
            panic!("expected order book");
        };
        assert!(book.full);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids.len(), 1);

        // A priceless update resolves through tracked state and must
        // not clobber the opposite side.
        let update = r#"{"table":"orderBookL2_25","action":"update","data":[{"symbol":"XBTUSD","id":100,"side":"Sell","size":1500},{"symbol":"XBTUSD","id":101,"side":"Buy","size":500}]}"#;
        let Decoded::Messages(msgs) = ctx_decode(&mut tracker, update).unwrap() else {
            panic!("expected messages");
        };
        let Msg::OrderBook(book) = &msgs[0] else {
            panic!("expected order book");
        };
        assert!(!book.full);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids.len(), 1);
        assert!((book.asks[0].price - 50_001.0).abs() < 1e-9);
        assert!((book.asks[0].quantity - 1500.0 / 50_001.0).abs() < 1e-12);
        assert!((book.bids[0].price - 49_999.0).abs() < 1e-9);
    }

    #[test]
    fn delete_emits_zero_quantity_level() {
        let mut tracker = OrderBookTracker::new();
        let partial = r#"{"table":"orderBookL2_25","action":"partial","data":[{"symbol":"XBTUSD","id":100,"side":"Sell","size":1000,"price":50001.0}]}"#;
        ctx_decode(&mut tracker, partial).unwrap();

        let delete = r#"{"table":"orderBookL2_25","action":"delete","data":[{"symbol":"XBTUSD","id":100,"side":"Sell"}]}"#;
        let Decoded::Messages(msgs) = ctx_decode(&mut tracker, delete).unwrap() else {
            panic!("expected messages");
        };
        let Msg::OrderBook(book) = &msgs[0] else {
            panic!("expected order book");
        };
        assert_eq!(book.asks.len(), 1);
        assert!((book.asks[0].quantity - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_delete_is_a_protocol_violation_and_book_resyncs() {
        let mut tracker = OrderBookTracker::new();
        let partial = r#"{"table":"orderBookL2_25","action":"partial","data":[{"symbol":"XBTUSD","id":100,"side":"Sell","size":1000,"price":50001.0}]}"#;
        ctx_decode(&mut tracker, partial).unwrap();

        let delete = r#"{"table":"orderBookL2_25","action":"delete","data":[{"symbol":"XBTUSD","id":999,"side":"Sell"}]}"#;
        let err = ctx_decode(&mut tracker, delete).unwrap_err();
        assert!(matches!(err, DecodeError::Protocol { .. }));
        assert!(!tracker.is_synced("XBTUSD"));

        // The next partial restores the book.
        ctx_decode(&mut tracker, partial).unwrap();
        assert!(tracker.is_synced("XBTUSD"));
    }

    #[test]
    fn trade_quantity_is_home_notional() {
        let mut tracker = OrderBookTracker::new();
        let frame = r#"{"table":"trade","action":"insert","data":[{"timestamp":"2023-11-14T22:13:20.000Z","symbol":"XBTUSD","side":"Sell","size":5000,"price":50000.0,"tickDirection":"MinusTick","trdMatchID":"abc-123","grossValue":10000000,"homeNotional":0.1,"foreignNotional":5000}]}"#;
        let Decoded::Messages(msgs) = ctx_decode(&mut tracker, frame).unwrap() else {
            panic!("expected messages");
        };
        let Msg::Trade(trade) = &msgs[0] else {
            panic!("expected trade");
        };
        assert!((trade.quantity - 0.1).abs() < 1e-12);
        assert!(trade.side);
        assert_eq!(trade.trade_id, "abc-123");
    }
}

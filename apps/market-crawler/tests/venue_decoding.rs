//! Venue Decoding Integration Tests
//!
//! Exercises the full inbound pipeline per venue: frame decompression,
//! adapter decoding, channel mapping, and quantity conversion, using
//! captured wire-format fixtures.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::io::Write;

use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use test_case::test_case;

use market_crawler::infrastructure::connection::FrameCodec;
use market_crawler::infrastructure::venues::adapter_for;
use market_crawler::{
    ChannelType, DecodeContext, Decoded, Exchange, FrameKind, Market, MarketRegistry, MarketType,
    Msg, OrderBookTracker,
};

fn market(
    exchange: Exchange,
    market_type: MarketType,
    pair: &str,
    raw_id: &str,
    contract_value: Option<f64>,
) -> Market {
    let mut parts = pair.split('_');
    Market {
        exchange,
        market_type,
        pair: pair.to_string(),
        raw_id: raw_id.to_string(),
        base: parts.next().unwrap_or_default().to_string(),
        quote: parts.next().unwrap_or_default().to_string(),
        contract_value,
        price_precision: 2,
    }
}

fn decode_with(
    exchange: Exchange,
    market_type: MarketType,
    registry: &MarketRegistry,
    frame: &str,
) -> Decoded {
    let adapter = adapter_for(exchange);
    let mut tracker = OrderBookTracker::new();
    let mut ctx = DecodeContext {
        market_type,
        registry,
        tracker: &mut tracker,
    };
    adapter.decode(&mut ctx, frame).unwrap()
}

// =============================================================================
// Channel mapping properties
// =============================================================================

#[test_case(Exchange::Binance, MarketType::Spot, "BTCUSDT", None; "binance spot")]
#[test_case(Exchange::Huobi, MarketType::Spot, "btcusdt", None; "huobi spot")]
#[test_case(Exchange::Okx, MarketType::Swap, "BTC-USDT-SWAP", Some(0.01); "okx swap")]
#[test_case(Exchange::Bitmex, MarketType::Swap, "XBTUSD", Some(1.0); "bitmex swap")]
#[test_case(Exchange::Kraken, MarketType::Spot, "XBT/USDT", None; "kraken spot")]
fn raw_channels_map_back_to_their_type(
    exchange: Exchange,
    market_type: MarketType,
    raw_id: &str,
    contract_value: Option<f64>,
) {
    let registry = MarketRegistry::new(vec![market(
        exchange,
        market_type,
        "BTC_USDT",
        raw_id,
        contract_value,
    )]);
    let adapter = adapter_for(exchange);

    for channel_type in ChannelType::all() {
        let Ok(channels) =
            adapter.to_raw_channels(market_type, *channel_type, "BTC_USDT", &registry)
        else {
            // Unsupported combinations are allowed; unknown pairs are not.
            continue;
        };
        assert!(!channels.is_empty());
        for channel in &channels {
            assert_eq!(
                adapter.from_raw_channel(channel).unwrap(),
                *channel_type,
                "{exchange} channel {channel} did not round-trip"
            );
        }
    }
}

#[test_case(Exchange::Binance; "binance")]
#[test_case(Exchange::Huobi; "huobi")]
#[test_case(Exchange::Okx; "okx")]
#[test_case(Exchange::Bitmex; "bitmex")]
#[test_case(Exchange::Kraken; "kraken")]
fn unknown_pairs_are_rejected_at_mapping_time(exchange: Exchange) {
    let registry = MarketRegistry::new(Vec::new());
    let adapter = adapter_for(exchange);
    let market_type = if exchange == Exchange::Bitmex {
        MarketType::Swap
    } else {
        MarketType::Spot
    };
    assert!(
        adapter
            .to_raw_channels(market_type, ChannelType::Trade, "DOES_NOTEXIST", &registry)
            .is_err()
    );
}

// =============================================================================
// Compressed transports
// =============================================================================

#[test]
fn huobi_gzip_frames_flow_through_the_codec() {
    let registry = MarketRegistry::new(vec![market(
        Exchange::Huobi,
        MarketType::Spot,
        "BTC_USDT",
        "btcusdt",
        None,
    )]);

    let frame = r#"{"ch":"market.btcusdt.trade.detail","ts":1700000000600,"tick":{"id":1,"ts":1700000000600,"data":[{"amount":0.5,"ts":1700000000598,"id":100,"tradeId":100,"price":40000.0,"direction":"sell"}]}}"#;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(frame.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let text = FrameCodec::new(FrameKind::Gzip).decode(&compressed).unwrap();
    let Decoded::Messages(msgs) = decode_with(Exchange::Huobi, MarketType::Spot, &registry, &text)
    else {
        panic!("expected messages");
    };
    let Msg::Trade(trade) = &msgs[0] else {
        panic!("expected trade");
    };
    assert!(trade.side);
    assert_eq!(trade.envelope.pair, "BTC_USDT");
}

#[test]
fn okx_deflate_frames_flow_through_the_codec() {
    let registry = MarketRegistry::new(vec![market(
        Exchange::Okx,
        MarketType::Swap,
        "BTC_USD",
        "BTC-USD-SWAP",
        Some(100.0),
    )]);

    let frame = r#"{"table":"swap/trade","data":[{"instrument_id":"BTC-USD-SWAP","price":"50000.0","side":"buy","size":"50","timestamp":"2023-11-14T22:13:20.000Z","trade_id":"9"}]}"#;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(frame.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let text = FrameCodec::new(FrameKind::Deflate)
        .decode(&compressed)
        .unwrap();
    let Decoded::Messages(msgs) = decode_with(Exchange::Okx, MarketType::Swap, &registry, &text)
    else {
        panic!("expected messages");
    };
    let Msg::Trade(trade) = &msgs[0] else {
        panic!("expected trade");
    };
    // 50 inverse contracts of 100 USD at 50k = 0.1 BTC.
    assert!((trade.quantity - 0.1).abs() < 1e-12);
    assert!(!trade.side);
}

// =============================================================================
// Control frames never reach the sink
// =============================================================================

#[test]
fn control_frames_are_skipped_or_answered() {
    let kraken_registry = MarketRegistry::new(vec![market(
        Exchange::Kraken,
        MarketType::Spot,
        "BTC_USD",
        "XBT/USD",
        None,
    )]);
    let huobi_registry = MarketRegistry::new(vec![market(
        Exchange::Huobi,
        MarketType::Spot,
        "BTC_USDT",
        "btcusdt",
        None,
    )]);

    // Acks and banners.
    assert_eq!(
        decode_with(
            Exchange::Kraken,
            MarketType::Spot,
            &kraken_registry,
            r#"{"event":"systemStatus","status":"online"}"#
        ),
        Decoded::Skip
    );

    // Server-initiated pings get answered inline.
    let Decoded::Reply(reply) = decode_with(
        Exchange::Huobi,
        MarketType::Spot,
        &huobi_registry,
        r#"{"ping":42}"#,
    ) else {
        panic!("expected reply");
    };
    assert_eq!(reply, r#"{"pong":42}"#);
}

// =============================================================================
// Side convention is uniform
// =============================================================================

#[test]
fn sell_side_is_true_on_every_venue() {
    // One sell-side trade per venue, each in its native encoding.
    let cases: Vec<(Exchange, MarketType, Market, &str)> = vec![
        (
            Exchange::Binance,
            MarketType::Spot,
            market(Exchange::Binance, MarketType::Spot, "BTC_USDT", "BTCUSDT", None),
            r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"1","q":"1","T":1,"m":true,"M":true}}"#,
        ),
        (
            Exchange::Huobi,
            MarketType::Spot,
            market(Exchange::Huobi, MarketType::Spot, "BTC_USDT", "btcusdt", None),
            r#"{"ch":"market.btcusdt.trade.detail","ts":1,"tick":{"id":1,"ts":1,"data":[{"amount":1,"ts":1,"id":1,"tradeId":1,"price":1,"direction":"sell"}]}}"#,
        ),
        (
            Exchange::Okx,
            MarketType::Spot,
            market(Exchange::Okx, MarketType::Spot, "BTC_USDT", "BTC-USDT", None),
            r#"{"table":"spot/trade","data":[{"instrument_id":"BTC-USDT","price":"1","side":"sell","size":"1","timestamp":"2023-11-14T22:13:20.000Z","trade_id":"1"}]}"#,
        ),
        (
            Exchange::Bitmex,
            MarketType::Swap,
            market(Exchange::Bitmex, MarketType::Swap, "BTC_USD", "XBTUSD", Some(1.0)),
            r#"{"table":"trade","action":"insert","data":[{"timestamp":"2023-11-14T22:13:20.000Z","symbol":"XBTUSD","side":"Sell","size":1,"price":1.0,"trdMatchID":"x","homeNotional":1.0,"foreignNotional":1.0,"grossValue":1}]}"#,
        ),
        (
            Exchange::Kraken,
            MarketType::Spot,
            market(Exchange::Kraken, MarketType::Spot, "BTC_USD", "XBT/USD", None),
            r#"[1,[["1.0","1.0","1.5","s","l",""]],"trade","XBT/USD"]"#,
        ),
    ];

    for (exchange, market_type, m, frame) in cases {
        let registry = MarketRegistry::new(vec![m]);
        let Decoded::Messages(msgs) = decode_with(exchange, market_type, &registry, frame) else {
            panic!("{exchange}: expected messages");
        };
        let Msg::Trade(trade) = &msgs[0] else {
            panic!("{exchange}: expected trade");
        };
        assert!(trade.side, "{exchange} sell trade must have side true");
        assert_eq!(trade.envelope.exchange, exchange);
    }
}

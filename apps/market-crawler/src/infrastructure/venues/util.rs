//! Shared decoding helpers for venue adapters.

use std::sync::Arc;

use serde_json::Value;

use crate::application::ports::DecodeError;
use crate::domain::market::{Market, MarketRegistry};
use crate::domain::message::{ChannelType, MsgEnvelope};

/// A JSON number, or a number encoded as a string. Venues mix both.
pub(super) fn json_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Required numeric field.
pub(super) fn field_f64(obj: &Value, key: &'static str) -> Result<f64, DecodeError> {
    obj.get(key)
        .and_then(json_f64)
        .ok_or(DecodeError::MissingField(key))
}

/// Required integer field.
pub(super) fn field_i64(obj: &Value, key: &'static str) -> Result<i64, DecodeError> {
    obj.get(key)
        .and_then(Value::as_i64)
        .ok_or(DecodeError::MissingField(key))
}

/// Required string field.
pub(super) fn field_str<'a>(obj: &'a Value, key: &'static str) -> Result<&'a str, DecodeError> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField(key))
}

/// Required array field.
pub(super) fn field_array<'a>(
    obj: &'a Value,
    key: &'static str,
) -> Result<&'a Vec<Value>, DecodeError> {
    obj.get(key)
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField(key))
}

/// ISO 8601 timestamp to epoch milliseconds.
pub(super) fn iso_millis(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Current time, epoch milliseconds.
pub(super) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resolve the market behind a venue-native symbol. A frame for an
/// unlisted instrument means the subscription and the stream disagree.
pub(super) fn market_of<'a>(
    registry: &'a MarketRegistry,
    raw_pair: &str,
) -> Result<&'a Arc<Market>, DecodeError> {
    registry
        .by_raw_id(raw_pair)
        .ok_or_else(|| DecodeError::Protocol {
            raw_pair: raw_pair.to_string(),
            detail: "frame for an instrument outside the subscription".to_string(),
        })
}

/// Envelope for a decoded frame.
pub(super) fn envelope(
    market: &Market,
    channel: &str,
    channel_type: ChannelType,
    timestamp_ms: i64,
    raw: &str,
) -> MsgEnvelope {
    MsgEnvelope {
        exchange: market.exchange,
        market_type: market.market_type,
        pair: market.pair.clone(),
        raw_pair: market.raw_id.clone(),
        channel: channel.to_string(),
        channel_type,
        timestamp_ms,
        raw: raw.to_string(),
    }
}

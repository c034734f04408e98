//! Domain layer - Pure types and logic with no I/O dependencies.

/// Market metadata: exchanges, market types, trading-pair records.
pub mod market;

/// Canonical message schema emitted to downstream consumers.
pub mod message;

/// Per-venue order-book reconstruction state.
pub mod orderbook;

/// Contract-to-base-currency quantity conversion.
pub mod quantity;

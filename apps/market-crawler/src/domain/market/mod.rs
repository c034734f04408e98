//! Market Metadata Types
//!
//! A `Market` describes one tradable instrument on one venue: its raw
//! (venue-native) symbol, the canonical `BASE_QUOTE` pair, and the
//! contract metadata needed to convert venue sizes into base-currency
//! quantities. Markets are loaded once per crawl session from the
//! Market Directory and never mutated afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// =============================================================================
// Exchange
// =============================================================================

/// Supported exchange venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// Binance spot streams.
    Binance,
    /// Huobi (gzip-compressed frames).
    Huobi,
    /// OKX v3 (raw-deflate frames, derivative contracts).
    Okx,
    /// BitMEX (id-keyed order-book deltas).
    Bitmex,
    /// Kraken (array-framed payloads).
    Kraken,
}

impl Exchange {
    /// All supported venues.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Binance,
            Self::Huobi,
            Self::Okx,
            Self::Bitmex,
            Self::Kraken,
        ]
    }

    /// Canonical display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "Binance",
            Self::Huobi => "Huobi",
            Self::Okx => "OKX",
            Self::Bitmex => "BitMEX",
            Self::Kraken => "Kraken",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "huobi" => Ok(Self::Huobi),
            "okx" | "okex" => Ok(Self::Okx),
            "bitmex" => Ok(Self::Bitmex),
            "kraken" => Ok(Self::Kraken),
            _ => Err(UnknownExchange(s.to_string())),
        }
    }
}

/// Error for an unrecognized exchange name.
#[derive(Debug, thiserror::Error)]
#[error("unknown exchange: {0}")]
pub struct UnknownExchange(pub String);

// =============================================================================
// Market Type
// =============================================================================

/// Kind of market an instrument trades on.
///
/// Determines which channel types and quantity-conversion rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    /// Spot market: sizes are already base-currency quantities.
    Spot,
    /// Perpetual swap: sizes are contract counts.
    Swap,
    /// Dated futures: sizes are contract counts.
    Futures,
}

impl MarketType {
    /// Lower-case name, used by venues that embed it in channel names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Swap => "swap",
            Self::Futures => "futures",
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MarketType {
    type Err = UnknownMarketType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "swap" => Ok(Self::Swap),
            "futures" => Ok(Self::Futures),
            _ => Err(UnknownMarketType(s.to_string())),
        }
    }
}

/// Error for an unrecognized market type name.
#[derive(Debug, thiserror::Error)]
#[error("unknown market type: {0}")]
pub struct UnknownMarketType(pub String);

// =============================================================================
// Market
// =============================================================================

/// One tradable instrument on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Venue this market trades on.
    pub exchange: Exchange,
    /// Spot, Swap or Futures.
    pub market_type: MarketType,
    /// Canonical pair, upper case `BASE_QUOTE` (e.g. `BTC_USDT`).
    pub pair: String,
    /// Venue-native symbol (e.g. `XBTUSD`, `BTC-USD-SWAP`).
    pub raw_id: String,
    /// Base asset.
    pub base: String,
    /// Quote asset.
    pub quote: String,
    /// Fixed notional represented by one contract.
    ///
    /// For inverse contracts (quote = USD) this is quote units per
    /// contract; for linear contracts (quote = USDT) it is base units
    /// per contract. `None` for spot markets.
    #[serde(default)]
    pub contract_value: Option<f64>,
    /// Number of decimal places in quoted prices.
    #[serde(default)]
    pub price_precision: u32,
}

// =============================================================================
// Market Registry
// =============================================================================

/// Immutable lookup index over the markets of one crawl session.
///
/// Keyed by venue-native symbol and by canonical pair for O(1) access
/// from the decode path.
#[derive(Debug, Default)]
pub struct MarketRegistry {
    by_raw_id: HashMap<String, Arc<Market>>,
    by_pair: HashMap<String, Vec<Arc<Market>>>,
    pairs: Vec<String>,
}

impl MarketRegistry {
    /// Build a registry from directory-supplied market records.
    #[must_use]
    pub fn new(markets: Vec<Market>) -> Self {
        let mut by_raw_id = HashMap::with_capacity(markets.len());
        let mut by_pair: HashMap<String, Vec<Arc<Market>>> = HashMap::new();
        let mut pairs = Vec::new();

        for market in markets {
            let market = Arc::new(market);
            by_raw_id.insert(market.raw_id.clone(), Arc::clone(&market));
            let entry = by_pair.entry(market.pair.clone()).or_default();
            if entry.is_empty() {
                pairs.push(market.pair.clone());
            }
            entry.push(market);
        }

        Self {
            by_raw_id,
            by_pair,
            pairs,
        }
    }

    /// Resolve a market by its venue-native symbol.
    #[must_use]
    pub fn by_raw_id(&self, raw_id: &str) -> Option<&Arc<Market>> {
        self.by_raw_id.get(raw_id)
    }

    /// All markets for a canonical pair (futures pairs may have several).
    #[must_use]
    pub fn by_pair(&self, pair: &str) -> &[Arc<Market>] {
        self.by_pair.get(pair).map_or(&[], Vec::as_slice)
    }

    /// All canonical pairs, in insertion order.
    #[must_use]
    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Number of markets in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_raw_id.len()
    }

    /// Whether the registry holds no markets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_raw_id.is_empty()
    }
}

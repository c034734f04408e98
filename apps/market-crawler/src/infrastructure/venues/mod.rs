//! Venue Adapters
//!
//! One `VenueAdapter` per exchange. Each adapter owns the venue's
//! endpoint, channel naming, subscription grammar, and frame decoding;
//! everything else about a connection is venue-agnostic.

mod binance;
mod bitmex;
mod huobi;
mod kraken;
mod okx;
mod util;

use std::sync::Arc;

pub use binance::BinanceAdapter;
pub use bitmex::BitmexAdapter;
pub use huobi::HuobiAdapter;
pub use kraken::KrakenAdapter;
pub use okx::OkxAdapter;

use crate::application::ports::AdapterHandle;
use crate::domain::market::Exchange;

/// The adapter speaking for `exchange`.
#[must_use]
pub fn adapter_for(exchange: Exchange) -> AdapterHandle {
    match exchange {
        Exchange::Binance => Arc::new(BinanceAdapter),
        Exchange::Huobi => Arc::new(HuobiAdapter),
        Exchange::Okx => Arc::new(OkxAdapter),
        Exchange::Bitmex => Arc::new(BitmexAdapter),
        Exchange::Kraken => Arc::new(KrakenAdapter),
    }
}

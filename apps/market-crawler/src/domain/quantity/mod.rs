//! Contract Quantity Conversion
//!
//! Derivative venues report sizes in contracts; spot venues in base
//! currency. `base_quantity` collapses both into base-currency units so
//! every `Msg` carries comparable quantities.
//!
//! Conversion rules keyed on the market's quote currency:
//! - spot: size already is base quantity
//! - linear contract (quoted in `USDT`): `size * contract_value`
//! - inverse contract (quoted in `USD`): `size * contract_value / price`

use crate::domain::market::{Market, MarketType};

/// Errors from converting contract sizes into base quantities.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuantityError {
    /// A derivative market is missing its contract multiplier.
    #[error("{exchange} {market_type} market {pair} has no contract value")]
    MissingContractValue {
        /// The venue.
        exchange: crate::domain::market::Exchange,
        /// Market type of the instrument.
        market_type: MarketType,
        /// The canonical pair.
        pair: String,
    },
}

/// Convert a venue-reported size into base-currency quantity.
///
/// # Errors
///
/// Fails when a derivative market carries no contract value.
pub fn base_quantity(market: &Market, size: f64, price: f64) -> Result<f64, QuantityError> {
    if market.market_type == MarketType::Spot {
        return Ok(size);
    }

    let contract_value =
        market
            .contract_value
            .ok_or_else(|| QuantityError::MissingContractValue {
                exchange: market.exchange,
                market_type: market.market_type,
                pair: market.pair.clone(),
            })?;

    // Inverse contracts quote in USD and denominate the contract in quote
    // currency, so dividing by price lands back in base units.
    if market.quote == "USD" {
        Ok(size * contract_value / price)
    } else {
        Ok(size * contract_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Exchange;

    fn market(market_type: MarketType, quote: &str, contract_value: Option<f64>) -> Market {
        Market {
            exchange: Exchange::Bitmex,
            market_type,
            pair: format!("BTC_{quote}"),
            raw_id: "XBTUSD".to_string(),
            base: "BTC".to_string(),
            quote: quote.to_string(),
            contract_value,
            price_precision: 1,
        }
    }

    #[test]
    fn spot_passes_through() {
        let m = market(MarketType::Spot, "USD", None);
        let qty = base_quantity(&m, 2.5, 40_000.0).unwrap();
        assert!((qty - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn inverse_contract_divides_by_price() {
        // 100 contracts of 1 USD each at 50k USD/BTC = 0.002 BTC.
        let m = market(MarketType::Swap, "USD", Some(1.0));
        let qty = base_quantity(&m, 100.0, 50_000.0).unwrap();
        assert!((qty - 0.002).abs() < 1e-12);
    }

    #[test]
    fn linear_contract_multiplies() {
        // 10 contracts of 0.001 BTC each = 0.01 BTC, price ignored.
        let m = market(MarketType::Swap, "USDT", Some(0.001));
        let qty = base_quantity(&m, 10.0, 50_000.0).unwrap();
        assert!((qty - 0.01).abs() < 1e-12);
    }

    #[test]
    fn missing_contract_value_is_an_error() {
        let m = market(MarketType::Futures, "USD", None);
        assert!(base_quantity(&m, 1.0, 1.0).is_err());
    }
}

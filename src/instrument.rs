//! Instrument metadata and execution-path selection.
//!
//! Every order is dispatched on a closed [`ExecutionKind`] derived from the
//! order's product type and the instrument's type, so the fill logic pattern
//! matches instead of comparing type strings.

use crate::config::RiskConfig;
use crate::order::ProductType;
use crate::types::Leverage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Forex,
    Commodity,
    Crypto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub symbol: String,
    pub quote_currency: String,
    pub instrument_type: InstrumentType,
    // per-symbol cap, only forex pairs carry one
    pub max_leverage: Option<Leverage>,
}

impl InstrumentMeta {
    pub fn forex(symbol: &str, quote_currency: &str, max_leverage: Leverage) -> Self {
        Self {
            symbol: symbol.to_string(),
            quote_currency: quote_currency.to_string(),
            instrument_type: InstrumentType::Forex,
            max_leverage: Some(max_leverage),
        }
    }

    pub fn crypto(symbol: &str, quote_currency: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            quote_currency: quote_currency.to_string(),
            instrument_type: InstrumentType::Crypto,
            max_leverage: None,
        }
    }

    pub fn commodity(symbol: &str, quote_currency: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            quote_currency: quote_currency.to_string(),
            instrument_type: InstrumentType::Commodity,
            max_leverage: None,
        }
    }

    /// Base asset, taken as the symbol with the quote suffix removed
    /// (`BTCUSDT` → `BTC`). Falls back to the whole symbol when the suffix
    /// does not match.
    pub fn base_currency(&self) -> &str {
        self.symbol
            .strip_suffix(self.quote_currency.as_str())
            .filter(|base| !base.is_empty())
            .unwrap_or(&self.symbol)
    }

    pub fn leverage_cap(&self, risk: &RiskConfig) -> Result<Leverage, InstrumentError> {
        match self.instrument_type {
            InstrumentType::Forex => self
                .max_leverage
                .ok_or_else(|| InstrumentError::MissingLeverageCap(self.symbol.clone())),
            InstrumentType::Commodity => Ok(risk.commodity_max_leverage),
            InstrumentType::Crypto => Ok(risk.crypto_max_leverage),
        }
    }

    pub fn execution_kind(
        &self,
        product: ProductType,
        risk: &RiskConfig,
    ) -> Result<ExecutionKind, InstrumentError> {
        if product == ProductType::Spot {
            return Ok(ExecutionKind::Spot {
                base_currency: self.base_currency().to_string(),
                quote_currency: self.quote_currency.clone(),
            });
        }

        let max_leverage = self.leverage_cap(risk)?;
        Ok(match self.instrument_type {
            InstrumentType::Forex => ExecutionKind::SingleLeverage { max_leverage },
            InstrumentType::Commodity | InstrumentType::Crypto => {
                ExecutionKind::DualLeverage { max_leverage }
            }
        })
    }
}

/// How an order gets filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionKind {
    /// Balance swap between base and quote currency, no position.
    Spot {
        base_currency: String,
        quote_currency: String,
    },
    /// One position on the order's side.
    SingleLeverage { max_leverage: Leverage },
    /// Long and short legs opened together, optionally mirrored at an LP.
    DualLeverage { max_leverage: Leverage },
}

/// Read access to instrument metadata.
pub trait InstrumentCatalog: Send + Sync {
    fn instrument(&self, symbol: &str) -> Option<InstrumentMeta>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    #[error("No max leverage configured for forex instrument {0}")]
    MissingLeverageCap(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_currency_strips_quote_suffix() {
        let btc = InstrumentMeta::crypto("BTCUSDT", "USDT");
        assert_eq!(btc.base_currency(), "BTC");

        let odd = InstrumentMeta::crypto("XAU", "USD");
        assert_eq!(odd.base_currency(), "XAU");
    }

    #[test]
    fn leverage_caps_by_type() {
        let risk = RiskConfig::default();
        let eur = InstrumentMeta::forex("EURUSD", "USD", Leverage::new(30).unwrap());
        assert_eq!(eur.leverage_cap(&risk).unwrap().value(), 30);

        let gold = InstrumentMeta::commodity("XAUUSD", "USD");
        assert_eq!(gold.leverage_cap(&risk).unwrap().value(), 100);

        let btc = InstrumentMeta::crypto("BTCUSDT", "USDT");
        assert_eq!(btc.leverage_cap(&risk).unwrap().value(), 50);
    }

    #[test]
    fn forex_without_cap_is_an_error() {
        let mut eur = InstrumentMeta::forex("EURUSD", "USD", Leverage::one());
        eur.max_leverage = None;
        let result = eur.leverage_cap(&RiskConfig::default());
        assert!(matches!(result, Err(InstrumentError::MissingLeverageCap(_))));
    }

    #[test]
    fn execution_kind_dispatch() {
        let risk = RiskConfig::default();
        let btc = InstrumentMeta::crypto("BTCUSDT", "USDT");
        let eur = InstrumentMeta::forex("EURUSD", "USD", Leverage::new(30).unwrap());

        assert!(matches!(
            btc.execution_kind(ProductType::Spot, &risk).unwrap(),
            ExecutionKind::Spot { .. }
        ));
        assert!(matches!(
            btc.execution_kind(ProductType::Futures, &risk).unwrap(),
            ExecutionKind::DualLeverage { .. }
        ));
        assert!(matches!(
            eur.execution_kind(ProductType::Forex, &risk).unwrap(),
            ExecutionKind::SingleLeverage { .. }
        ));
        // forex instruments stay single-leg even when booked as CFD
        assert!(matches!(
            eur.execution_kind(ProductType::Cfd, &risk).unwrap(),
            ExecutionKind::SingleLeverage { .. }
        ));
    }
}

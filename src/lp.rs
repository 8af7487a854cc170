// 9.0 lp.rs: external liquidity providers for A-book routing.
// 9.1 the provider set is fixed at startup.
// which one is primary or fallback comes from the routing config per call.
// 9.2 MockProvider fills deterministically so the A-book path can run without a network.

use crate::types::{Bps, OrderId, OrderSide, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpOrderRequest {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    // price the order was triggered at; providers may fill away from it
    pub reference_price: Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpFillStatus {
    Filled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpExecutionReport {
    pub lp_order_id: String,
    pub status: LpFillStatus,
    pub filled_quantity: Decimal,
    pub average_price: Price,
    pub fee: Quote,
    pub executed_at: Timestamp,
}

pub trait LiquidityProvider: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, request: &LpOrderRequest) -> Result<LpExecutionReport, LpError>;

    fn health_check(&self) -> Result<(), LpError>;
}

/// Registry of providers with primary/fallback failover.
#[derive(Default, Clone)]
pub struct ProviderManager {
    providers: HashMap<String, Arc<dyn LiquidityProvider>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn LiquidityProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn LiquidityProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LiquidityProvider>, LpError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LpError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Executes on `primary`; on any failure tries `fallback` if one is set.
    /// Returns the report with the name of the provider that filled.
    pub fn execute_with_failover(
        &self,
        primary: &str,
        fallback: Option<&str>,
        request: &LpOrderRequest,
    ) -> Result<(LpExecutionReport, String), LpError> {
        let first = self.get(primary).and_then(|p| filled(p.execute(request)?));
        let primary_err = match first {
            Ok(report) => return Ok((report, primary.to_string())),
            Err(e) => e,
        };

        let Some(fallback) = fallback else {
            return Err(primary_err);
        };
        warn!(
            order_id = %request.order_id,
            primary,
            fallback,
            error = %primary_err,
            "primary LP failed, trying fallback"
        );

        match self.get(fallback).and_then(|p| filled(p.execute(request)?)) {
            Ok(report) => Ok((report, fallback.to_string())),
            Err(fallback_err) => Err(LpError::Exhausted {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback_err),
            }),
        }
    }
}

// a "rejected" report is a failure too
fn filled(report: LpExecutionReport) -> Result<LpExecutionReport, LpError> {
    match report.status {
        LpFillStatus::Filled => Ok(report),
        LpFillStatus::Rejected => Err(LpError::Rejected {
            lp_order_id: report.lp_order_id,
        }),
    }
}

impl fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderManager")
            .field("providers", &self.names())
            .finish()
    }
}

/// In-process provider. Fills the full quantity at the reference price moved
/// against the taker by `slippage`, charging `fee` on the filled notional.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    slippage: Bps,
    fee: Bps,
    available: AtomicBool,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slippage: Bps::new(0),
            fee: Bps::new(0),
            available: AtomicBool::new(true),
        }
    }

    pub fn with_slippage(mut self, slippage: Bps) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn with_fee(mut self, fee: Bps) -> Self {
        self.fee = fee;
        self
    }

    // simulate an outage
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn fill_price(&self, side: OrderSide, reference: Price) -> Result<Price, LpError> {
        let adj = Decimal::ONE + side.exposure_sign() * self.slippage.as_fraction();
        Price::new(reference.value() * adj).ok_or_else(|| LpError::Unavailable {
            provider: self.name.clone(),
            reason: "slippage produced a non-positive price".to_string(),
        })
    }
}

impl LiquidityProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, request: &LpOrderRequest) -> Result<LpExecutionReport, LpError> {
        self.health_check()?;
        let average_price = self.fill_price(request.side, request.reference_price)?;
        let notional = request.quantity * average_price.value();
        let id = Uuid::new_v4().simple().to_string();
        Ok(LpExecutionReport {
            lp_order_id: format!("LP-{}", &id[..8]),
            status: LpFillStatus::Filled,
            filled_quantity: request.quantity,
            average_price,
            fee: Quote::new(notional * self.fee.as_fraction()),
            executed_at: Timestamp::now(),
        })
    }

    fn health_check(&self) -> Result<(), LpError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LpError::Unavailable {
                provider: self.name.clone(),
                reason: "provider offline".to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LpError {
    #[error("LP provider {0} not registered")]
    NotFound(String),

    #[error("LP {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("LP rejected order {lp_order_id}")]
    Rejected { lp_order_id: String },

    #[error("Primary LP failed ({primary}); fallback failed ({fallback})")]
    Exhausted {
        primary: Box<LpError>,
        fallback: Box<LpError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(side: OrderSide) -> LpOrderRequest {
        LpOrderRequest {
            order_id: OrderId::new(),
            symbol: "BTCUSDT".to_string(),
            side,
            quantity: dec!(2),
            reference_price: Price::new_unchecked(dec!(100)),
        }
    }

    #[test]
    fn mock_fills_at_reference_by_default() {
        let lp = MockProvider::new("mock_lp");
        let report = lp.execute(&request(OrderSide::Buy)).unwrap();
        assert_eq!(report.average_price.value(), dec!(100));
        assert_eq!(report.filled_quantity, dec!(2));
        assert_eq!(report.fee, Quote::zero());
        assert!(report.lp_order_id.starts_with("LP-"));
        assert_eq!(report.lp_order_id.len(), 11);
    }

    #[test]
    fn slippage_moves_against_taker() {
        let lp = MockProvider::new("mock_lp")
            .with_slippage(Bps::new(50))
            .with_fee(Bps::new(10));
        let buy = lp.execute(&request(OrderSide::Buy)).unwrap();
        let sell = lp.execute(&request(OrderSide::Sell)).unwrap();
        assert_eq!(buy.average_price.value(), dec!(100.5));
        assert_eq!(sell.average_price.value(), dec!(99.5));
        // 2 * 100.5 * 0.001
        assert_eq!(buy.fee.value(), dec!(0.201));
    }

    #[test]
    fn failover_to_fallback() {
        let primary = Arc::new(MockProvider::new("primary"));
        primary.set_available(false);
        let manager = ProviderManager::new()
            .with_provider(primary)
            .with_provider(Arc::new(MockProvider::new("backup")));

        let (_, used) = manager
            .execute_with_failover("primary", Some("backup"), &request(OrderSide::Buy))
            .unwrap();
        assert_eq!(used, "backup");
        assert_eq!(manager.names(), vec!["backup", "primary"]);
    }

    #[test]
    fn both_down_is_exhausted() {
        let primary = Arc::new(MockProvider::new("primary"));
        primary.set_available(false);
        let manager = ProviderManager::new().with_provider(primary);

        let no_fallback = manager.execute_with_failover("primary", None, &request(OrderSide::Buy));
        assert!(matches!(no_fallback, Err(LpError::Unavailable { .. })));

        let missing_fallback =
            manager.execute_with_failover("primary", Some("nowhere"), &request(OrderSide::Buy));
        assert!(matches!(missing_fallback, Err(LpError::Exhausted { .. })));
    }
}

//! Shared wiring for integration tests: one in-memory ledger, a manual clock,
//! and every component built on top of them.

#![allow(dead_code)]

use brokerage_core::*;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Desk {
    pub ledger: Arc<MemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub prices: Arc<PriceCache>,
    pub routing: Arc<InMemoryRoutingConfig>,
    pub primary: Arc<MockProvider>,
    pub backup: Arc<MockProvider>,
    pub engine: Engine,
    pub hedging: HedgingManager,
    pub monitor: LiquidationMonitor,
}

impl Desk {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        Self::try_with_config(config).expect("desk config should validate")
    }

    pub fn try_with_config(config: CoreConfig) -> Result<Self, ConfigError> {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_instrument(InstrumentMeta::crypto("BTCUSDT", "USDT"));
        ledger.add_instrument(InstrumentMeta::crypto("ETHUSD", "USD"));
        ledger.add_instrument(InstrumentMeta::commodity("XAUUSD", "USD"));
        ledger.add_instrument(InstrumentMeta::forex("EURUSD", "USD", Leverage::from_requested(10)));

        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let prices = Arc::new(PriceCache::with_clock(&config.price_cache, clock.clone()));
        let routing = Arc::new(InMemoryRoutingConfig::new(config.routing.clone()));

        let primary = Arc::new(MockProvider::new("mock_lp"));
        let backup = Arc::new(MockProvider::new("backup_lp"));
        let providers = ProviderManager::new()
            .with_provider(primary.clone())
            .with_provider(backup.clone());

        let hedging = HedgingManager::new(ledger.clone(), prices.clone(), &config.risk)?;
        let monitor = LiquidationMonitor::new(ledger.clone(), prices.clone());
        let engine = Engine::new(
            config,
            ledger.clone(),
            prices.clone(),
            routing.clone(),
            providers,
        )?;

        Ok(Self {
            ledger,
            clock,
            prices,
            routing,
            primary,
            backup,
            engine,
            hedging,
            monitor,
        })
    }

    pub fn order(
        &self,
        account: AccountId,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        leverage: u32,
        product: ProductType,
    ) -> OrderId {
        self.ledger
            .add_order(Order::market(account, symbol, side, amount, leverage, product))
    }

    // hedged futures order on BTCUSDT
    pub fn hedged(
        &self,
        account: AccountId,
        side: OrderSide,
        amount: Decimal,
        leverage: u32,
    ) -> OrderId {
        self.order(account, "BTCUSDT", side, amount, leverage, ProductType::Futures)
    }

    pub fn balance(&self, account: AccountId, currency: &str) -> Decimal {
        self.ledger.balance_of(account, currency)
    }
}

pub fn px(v: Decimal) -> Price {
    Price::new(v).expect("positive price")
}

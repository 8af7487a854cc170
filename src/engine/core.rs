// 3.0 engine/core.rs: the order execution engine. holds the collaborators, no state of its own.
// everything it mutates lives behind the Ledger, so many threads can share one Engine.

use crate::config::{ConfigError, CoreConfig};
use crate::ledger::Ledger;
use crate::lp::ProviderManager;
use crate::price_cache::PriceCache;
use crate::routing::{RoutingConfigStore, RoutingEngine};
use crate::types::Timestamp;
use std::sync::Arc;

/** 3.1: main engine struct */
pub struct Engine {
    pub(super) config: CoreConfig,
    pub(super) ledger: Arc<dyn Ledger>,
    pub(super) prices: Arc<PriceCache>,
    pub(super) routing: RoutingEngine,
    pub(super) providers: ProviderManager,
}

impl Engine {
    /// Refuses a config that fails `CoreConfig::validate`; margin and
    /// liquidation math rely on those bounds.
    pub fn new(
        config: CoreConfig,
        ledger: Arc<dyn Ledger>,
        prices: Arc<PriceCache>,
        routing_store: Arc<dyn RoutingConfigStore>,
        providers: ProviderManager,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ledger,
            prices,
            routing: RoutingEngine::new(routing_store),
            providers,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn prices(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    pub fn routing(&self) -> &RoutingEngine {
        &self.routing
    }

    pub fn providers(&self) -> &ProviderManager {
        &self.providers
    }

    // the price cache's clock is the engine's clock
    pub fn now(&self) -> Timestamp {
        self.prices.now()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("prices", &self.prices)
            .field("routing", &self.routing)
            .field("providers", &self.providers)
            .finish()
    }
}

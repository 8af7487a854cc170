//! Routing decision: keep an order on the internal book (B-book) or mirror it
//! at an external liquidity provider (A-book).
//!
//! Checks run in a fixed order and the first hit wins:
//!
//! 1. routing disabled: internal
//! 2. notional above the size threshold: external
//! 3. |instrument net exposure after the order| above the per-instrument limit: external
//! 4. |total net exposure after the order| above the total limit: external
//! 5. otherwise internal
//!
//! An exposure read failure falls back to the internal book instead of
//! blocking the order. Those fallbacks are logged at `warn` and counted, so a
//! persistent read problem is visible separately from routing being switched off.
//!
//! The configuration is re-read from the [`RoutingConfigStore`] on every
//! decision. Given the same configuration, ledger state and order, the
//! decision is always the same.

use crate::config::{validate_routing, ConfigError, RoutingConfig};
use crate::ledger::ExposureSource;
use crate::order::ExecutionStrategy;
use crate::types::{OrderSide, Price};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureScope {
    Instrument,
    Total,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingReason {
    Disabled,
    SizeThreshold { notional: Decimal, threshold: Decimal },
    InstrumentExposure { new_exposure: Decimal, limit: Decimal },
    TotalExposure { new_exposure: Decimal, limit: Decimal },
    ExposureUnavailable { scope: ExposureScope, cause: String },
    WithinLimits,
}

impl fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingReason::Disabled => write!(f, "LP routing is disabled"),
            RoutingReason::SizeThreshold {
                notional,
                threshold,
            } => write!(
                f,
                "Order notional (${notional:.2}) exceeds threshold (${threshold:.2})"
            ),
            RoutingReason::InstrumentExposure {
                new_exposure,
                limit,
            } => write!(
                f,
                "New exposure (${new_exposure:.2}) would exceed per-instrument limit (${limit:.2})"
            ),
            RoutingReason::TotalExposure {
                new_exposure,
                limit,
            } => write!(
                f,
                "New total exposure (${new_exposure:.2}) would exceed limit (${limit:.2})"
            ),
            RoutingReason::ExposureUnavailable {
                scope: ExposureScope::Instrument,
                cause,
            } => write!(f, "Failed to determine exposure: {cause}"),
            RoutingReason::ExposureUnavailable {
                scope: ExposureScope::Total,
                cause,
            } => write!(f, "Failed to determine total exposure: {cause}"),
            RoutingReason::WithinLimits => {
                write!(f, "Order size and exposure within B-Book limits")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub strategy: ExecutionStrategy,
    pub reason: RoutingReason,
    pub route_to_lp: bool,
    pub estimated_notional: Decimal,
}

impl RoutingDecision {
    fn internal(reason: RoutingReason, notional: Decimal) -> Self {
        Self {
            strategy: ExecutionStrategy::InternalBook,
            reason,
            route_to_lp: false,
            estimated_notional: notional,
        }
    }

    fn external(reason: RoutingReason, notional: Decimal) -> Self {
        Self {
            strategy: ExecutionStrategy::ExternalLp,
            reason,
            route_to_lp: true,
            estimated_notional: notional,
        }
    }

    pub fn is_fail_open(&self) -> bool {
        matches!(self.reason, RoutingReason::ExposureUnavailable { .. })
    }
}

/// Pure routing rule. Same inputs, same answer.
pub fn evaluate<E: ExposureSource + ?Sized>(
    config: &RoutingConfig,
    exposure: &E,
    symbol: &str,
    side: OrderSide,
    quantity: Decimal,
    price: Price,
) -> RoutingDecision {
    let notional = quantity * price.value();

    if !config.enabled {
        return RoutingDecision::internal(RoutingReason::Disabled, notional);
    }

    if notional > config.size_threshold {
        return RoutingDecision::external(
            RoutingReason::SizeThreshold {
                notional,
                threshold: config.size_threshold,
            },
            notional,
        );
    }

    let change = side.exposure_sign() * notional;

    let instrument = match exposure.net_exposure(symbol) {
        Ok(current) => current,
        Err(e) => {
            return RoutingDecision::internal(
                RoutingReason::ExposureUnavailable {
                    scope: ExposureScope::Instrument,
                    cause: e.to_string(),
                },
                notional,
            )
        }
    };
    let new_exposure = (instrument + change).abs();
    if new_exposure > config.exposure_limit_per_instrument {
        return RoutingDecision::external(
            RoutingReason::InstrumentExposure {
                new_exposure,
                limit: config.exposure_limit_per_instrument,
            },
            notional,
        );
    }

    let total = match exposure.total_net_exposure() {
        Ok(current) => current,
        Err(e) => {
            return RoutingDecision::internal(
                RoutingReason::ExposureUnavailable {
                    scope: ExposureScope::Total,
                    cause: e.to_string(),
                },
                notional,
            )
        }
    };
    let new_total = (total + change).abs();
    if new_total > config.exposure_limit_total {
        return RoutingDecision::external(
            RoutingReason::TotalExposure {
                new_exposure: new_total,
                limit: config.exposure_limit_total,
            },
            notional,
        );
    }

    RoutingDecision::internal(RoutingReason::WithinLimits, notional)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingUpdate {
    Enabled(bool),
    SizeThreshold(Decimal),
    ExposureLimitPerInstrument(Decimal),
    ExposureLimitTotal(Decimal),
    PrimaryLp(String),
    FallbackLp(Option<String>),
}

impl RoutingUpdate {
    fn apply_to(self, config: &mut RoutingConfig) {
        match self {
            RoutingUpdate::Enabled(on) => config.enabled = on,
            RoutingUpdate::SizeThreshold(v) => config.size_threshold = v,
            RoutingUpdate::ExposureLimitPerInstrument(v) => {
                config.exposure_limit_per_instrument = v
            }
            RoutingUpdate::ExposureLimitTotal(v) => config.exposure_limit_total = v,
            RoutingUpdate::PrimaryLp(name) => config.primary_lp = name,
            RoutingUpdate::FallbackLp(name) => config.fallback_lp = name,
        }
    }
}

/// Runtime-mutable routing settings.
pub trait RoutingConfigStore: Send + Sync {
    fn load(&self) -> Result<RoutingConfig, ConfigError>;

    /// Validates the result before storing it. An invalid update changes nothing.
    fn apply(&self, update: RoutingUpdate) -> Result<RoutingConfig, ConfigError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRoutingConfig {
    current: RwLock<RoutingConfig>,
}

impl InMemoryRoutingConfig {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }
}

impl RoutingConfigStore for InMemoryRoutingConfig {
    fn load(&self) -> Result<RoutingConfig, ConfigError> {
        Ok(self.current.read().clone())
    }

    fn apply(&self, update: RoutingUpdate) -> Result<RoutingConfig, ConfigError> {
        let mut guard = self.current.write();
        let mut next = guard.clone();
        update.apply_to(&mut next);
        validate_routing(&next)?;
        *guard = next.clone();
        Ok(next)
    }
}

pub struct RoutingEngine {
    store: Arc<dyn RoutingConfigStore>,
    fail_open: AtomicU64,
}

impl RoutingEngine {
    pub fn new(store: Arc<dyn RoutingConfigStore>) -> Self {
        Self {
            store,
            fail_open: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn RoutingConfigStore> {
        &self.store
    }

    // an unreadable config routes like a disabled one
    pub fn current_config(&self) -> RoutingConfig {
        match self.store.load() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "routing config unavailable, treating routing as disabled");
                RoutingConfig {
                    enabled: false,
                    ..RoutingConfig::default()
                }
            }
        }
    }

    pub fn decide<E: ExposureSource + ?Sized>(
        &self,
        exposure: &E,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Price,
    ) -> RoutingDecision {
        let config = self.current_config();
        let decision = evaluate(&config, exposure, symbol, side, quantity, price);

        match &decision.reason {
            RoutingReason::Disabled => debug!(symbol, "routing disabled, internal book"),
            RoutingReason::ExposureUnavailable { .. } => {
                self.fail_open.fetch_add(1, Ordering::Relaxed);
                warn!(
                    symbol,
                    cause = "exposure_unavailable",
                    reason = %decision.reason,
                    "routing failed open to internal book"
                );
            }
            reason => info!(
                symbol,
                %side,
                strategy = %decision.strategy,
                notional = %decision.estimated_notional,
                %reason,
                "routing decision"
            ),
        }
        decision
    }

    /// Decisions that fell back to the internal book because exposure could not be read.
    pub fn fail_open_count(&self) -> u64 {
        self.fail_open.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("fail_open", &self.fail_open_count())
            .finish()
    }
}

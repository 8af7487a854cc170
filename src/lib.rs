// brokerage-core: trade execution core for a multi-asset brokerage.
// money-first architecture: every fill, close and liquidation is one ledger transaction.
// all money math is rust_decimal; nothing here talks to a network.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, OrderSide, PositionSide, Price, Quote, Leverage
//   2.x  order.rs: orders, statuses, trigger conditions
//   2.5  instrument.rs: instrument metadata, leverage caps, execution kind
//   3.x  engine/: order execution: spot, single, hedged pair, A-book
//   4.x  position.rs: contracts, pnl, close and liquidation settlement
//   4.5  margin.rs: fees, per-leg margin, liquidation price, account metrics
//   5.x  price_cache.rs: last price per symbol with staleness window
//   6.x  ledger/: storage traits + in-memory transactional ledger
//   7.x  config.rs: fees, risk params, routing, env presets
//   8.x  audit.rs: transaction records and LP routes
//   9.x  routing.rs: B-book vs A-book decision
//   9.5  lp.rs: liquidity providers, failover
//   10.x account.rs: accounts, currency equivalence, funding resolution
//   11.x hedging.rs: hedged pairs, leg and pair close
//   12.x liquidation.rs: tick-driven liquidation monitor
//   14.x telemetry.rs: tracing subscriber for binaries

// core execution modules
pub mod engine;
pub mod hedging;
pub mod liquidation;
pub mod margin;
pub mod order;
pub mod position;
pub mod types;

// market and account state
pub mod account;
pub mod instrument;
pub mod price_cache;

// routing and external liquidity
pub mod lp;
pub mod routing;

// integration modules
pub mod audit;
pub mod config;
pub mod ledger;
pub mod telemetry;

// re exports for convenience
pub use account::*;
pub use audit::*;
pub use engine::*;
pub use hedging::*;
pub use instrument::*;
pub use liquidation::*;
pub use margin::*;
pub use order::*;
pub use position::*;
pub use price_cache::*;
pub use types::*;
pub use config::{
    ConfigError, CoreConfig, Environment, FeeConfig, PriceCacheConfig, RiskConfig, RoutingConfig,
};
pub use ledger::{
    AccountLedger, AuditLedger, ExecutionContext, ExposureSource, Fault, Ledger, LedgerError,
    LedgerTx, MemoryLedger, NumberKind, OrderLedger, OrderLock, OrderLocks, PositionLedger,
};
pub use lp::{
    LiquidityProvider, LpError, LpExecutionReport, LpFillStatus, LpOrderRequest, MockProvider,
    ProviderManager,
};
pub use routing::{
    InMemoryRoutingConfig, RoutingConfigStore, RoutingDecision, RoutingEngine, RoutingReason,
    RoutingUpdate,
};

// 3.0: order execution engine. decides how a pending order fills, locks margin,
// opens single or hedged positions, and routes to an LP when the book is too exposed.
// synchronous; every fill is one ledger transaction.

mod core;
mod external;
mod orders;
mod positions;
mod results;

pub use core::Engine;
pub use results::{EngineError, ExecutionResult, Rejection};

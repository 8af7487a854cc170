// 3.0.2: result types and errors for execution.
// soft failures are values (Rejection inside ExecutionResult), hard failures are EngineError.

use crate::audit::LpRoute;
use crate::instrument::InstrumentError;
use crate::ledger::LedgerError;
use crate::order::{ExecutionStrategy, Order, OrderStatus};
use crate::position::{Contract, PositionError};
use crate::routing::RoutingDecision;
use crate::types::{Leverage, PairId, Quote};
use std::fmt;

/// Expected business outcomes that stop an execution without a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotPending { status: OrderStatus },
    LeverageExceeded { requested: Leverage, max: Leverage },
    InsufficientFunds {
        currency: String,
        required: Quote,
        available: Quote,
    },
    TriggerNotMet { reason: String },
    NoMarketPrice { symbol: String, cause: String },
    LpRejected { reason: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotPending { status } => {
                write!(f, "Order is not pending (current status: {status})")
            }
            Rejection::LeverageExceeded { requested, max } => {
                write!(f, "Leverage {requested} exceeds instrument maximum of {max}")
            }
            Rejection::InsufficientFunds {
                currency,
                required,
                available,
            } => write!(
                f,
                "Insufficient {currency} balance: required {}, available {}",
                required.value().normalize(),
                available.value().normalize()
            ),
            Rejection::TriggerNotMet { reason } => write!(f, "Order not triggerable: {reason}"),
            Rejection::NoMarketPrice { symbol, cause } => {
                write!(f, "No market price for {symbol}: {cause}")
            }
            Rejection::LpRejected { reason } => write!(f, "LP execution failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub order: Order,
    pub success: bool,
    pub message: String,
    pub rejection: Option<Rejection>,
    // long first for hedged opens
    pub contracts: Vec<Contract>,
    pub pair_id: Option<PairId>,
    pub lp_route: Option<LpRoute>,
    pub routing: Option<RoutingDecision>,
    pub strategy: Option<ExecutionStrategy>,
    // currency actually debited
    pub funding_currency: Option<String>,
    // currency actually credited (spot only)
    pub settlement_currency: Option<String>,
}

impl ExecutionResult {
    pub fn filled(order: Order, message: String) -> Self {
        Self {
            order,
            success: true,
            message,
            rejection: None,
            contracts: Vec::new(),
            pair_id: None,
            lp_route: None,
            routing: None,
            strategy: None,
            funding_currency: None,
            settlement_currency: None,
        }
    }

    pub fn rejected(order: Order, rejection: Rejection) -> Self {
        Self {
            order,
            success: false,
            message: rejection.to_string(),
            rejection: Some(rejection),
            contracts: Vec::new(),
            pair_id: None,
            lp_route: None,
            routing: None,
            strategy: None,
            funding_currency: None,
            settlement_currency: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),
}

// early exit from an execution path: either a soft rejection or a hard fault
#[derive(Debug)]
pub(super) enum Halt {
    Rejected(Rejection),
    Failed(EngineError),
}

impl From<Rejection> for Halt {
    fn from(r: Rejection) -> Self {
        Halt::Rejected(r)
    }
}

impl From<EngineError> for Halt {
    fn from(e: EngineError) -> Self {
        Halt::Failed(e)
    }
}

// a debit that lost a race to a concurrent one is a normal insufficient-funds outcome
impl From<LedgerError> for Halt {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds {
                currency,
                required,
                available,
            } => Halt::Rejected(Rejection::InsufficientFunds {
                currency,
                required,
                available,
            }),
            other => Halt::Failed(EngineError::Ledger(other)),
        }
    }
}

impl From<InstrumentError> for Halt {
    fn from(e: InstrumentError) -> Self {
        Halt::Failed(EngineError::Instrument(e))
    }
}

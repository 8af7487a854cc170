// 6.0: storage seam. the core never talks to a database directly, only to these traits.
// every state-mutating operation runs inside one LedgerTx:
// commit publishes it, drop throws it away.
// 6.1 memory.rs is the in-process implementation used by tests and the simulator.

mod memory;

pub use memory::{Fault, MemoryLedger};

use crate::audit::{LpRoute, TransactionRecord};
use crate::instrument::InstrumentMeta;
use crate::order::Order;
use crate::position::Contract;
use crate::types::{AccountId, ContractId, OrderId, PairId, Quote};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Balances per account and currency. Balances never go negative.
pub trait AccountLedger {
    fn account_currency(&self, account: AccountId) -> Result<String, LedgerError>;

    fn balance(&self, account: AccountId, currency: &str) -> Result<Quote, LedgerError>;

    /// Conditional debit. Fails with [`LedgerError::InsufficientFunds`] instead
    /// of taking the balance below zero. Returns the new balance.
    fn debit(&mut self, account: AccountId, currency: &str, amount: Quote)
        -> Result<Quote, LedgerError>;

    /// Credits, creating the balance row when it does not exist yet.
    fn credit(&mut self, account: AccountId, currency: &str, amount: Quote)
        -> Result<Quote, LedgerError>;
}

pub trait PositionLedger {
    fn insert_contract(&mut self, contract: Contract) -> Result<(), LedgerError>;

    fn contract(&self, id: ContractId) -> Result<Contract, LedgerError>;

    fn update_contract(&mut self, contract: &Contract) -> Result<(), LedgerError>;

    fn contracts_by_pair(&self, pair_id: PairId) -> Result<Vec<Contract>, LedgerError>;

    fn contracts_by_account(&self, account: AccountId) -> Result<Vec<Contract>, LedgerError>;

    // open contracts for the symbol that carry a liquidation price
    fn open_contracts_for_symbol(&self, symbol: &str) -> Result<Vec<Contract>, LedgerError>;
}

/// Everything execution needs about an order, read in one go.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub order: Order,
    pub account_currency: String,
    pub instrument: InstrumentMeta,
}

pub trait OrderLedger {
    fn load_execution_context(&self, order_id: OrderId) -> Result<ExecutionContext, LedgerError>;

    fn update_order(&mut self, order: &Order) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Contract,
    Transaction,
}

impl NumberKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            NumberKind::Contract => "CT",
            NumberKind::Transaction => "TX",
        }
    }
}

pub trait AuditLedger {
    fn record_transaction(&mut self, record: TransactionRecord) -> Result<(), LedgerError>;

    fn record_lp_route(&mut self, route: LpRoute) -> Result<(), LedgerError>;

    // human-readable number, e.g. CT-000042
    fn next_number(&mut self, kind: NumberKind) -> Result<String, LedgerError>;
}

/// Signed notional of open positions: long adds size * entry, short subtracts it.
pub trait ExposureSource {
    fn net_exposure(&self, symbol: &str) -> Result<Decimal, LedgerError>;

    fn total_net_exposure(&self) -> Result<Decimal, LedgerError>;
}

/// One atomic unit of work.
pub trait LedgerTx: AccountLedger + PositionLedger + OrderLedger + AuditLedger + ExposureSource {
    fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

pub trait Ledger: ExposureSource + Send + Sync {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, LedgerError>;

    /// Non-blocking exclusive claim on an order. A second claim while the
    /// first guard is alive fails with [`LedgerError::AlreadyLocked`].
    fn lock_order_for_execution(&self, order_id: OrderId) -> Result<OrderLock, LedgerError>;
}

/// In-process per-order lock table. Any ledger can hand these out.
#[derive(Debug, Default, Clone)]
pub struct OrderLocks {
    held: Arc<DashMap<OrderId, ()>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_lock(&self, order_id: OrderId) -> Result<OrderLock, LedgerError> {
        match self.held.entry(order_id) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyLocked(order_id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(OrderLock {
                    order_id,
                    held: Arc::clone(&self.held),
                })
            }
        }
    }

    pub fn is_locked(&self, order_id: OrderId) -> bool {
        self.held.contains_key(&order_id)
    }
}

/// Released on drop.
#[derive(Debug)]
pub struct OrderLock {
    order_id: OrderId,
    held: Arc<DashMap<OrderId, ()>>,
}

impl OrderLock {
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }
}

impl Drop for OrderLock {
    fn drop(&mut self) {
        self.held.remove(&self.order_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Order {0} is already being executed")]
    AlreadyLocked(OrderId),

    #[error("Insufficient {currency} balance: required {required}, available {available}")]
    InsufficientFunds {
        currency: String,
        required: Quote,
        available: Quote,
    },

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_lock_is_exclusive_until_dropped() {
        let locks = OrderLocks::new();
        let id = OrderId::new();

        let guard = locks.try_lock(id).unwrap();
        assert_eq!(guard.order_id(), id);
        assert_eq!(locks.try_lock(id).unwrap_err(), LedgerError::AlreadyLocked(id));

        // other orders are unaffected
        let other = locks.try_lock(OrderId::new());
        assert!(other.is_ok());

        drop(guard);
        assert!(!locks.is_locked(id));
        assert!(locks.try_lock(id).is_ok());
    }
}

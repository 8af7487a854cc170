//! Hedged pair lifecycle.
//!
//! A pair is the long and short contract opened together for one hedged
//! order. Legs close independently (`close_leg`) or together (`close_pair`).
//! Closing one leg never touches its sibling. An unbalanced hedge is logged
//! and reported back to the caller, never blocked.

use crate::audit::{TransactionRecord, TransactionType};
use crate::config::{ConfigError, RiskConfig};
use crate::ledger::{Ledger, LedgerError, LedgerTx, NumberKind};
use crate::margin::{account_metrics, check_maintenance, AccountMetrics, MaintenanceCheck};
use crate::position::{Contract, ContractStatus, PositionError, Settlement};
use crate::price_cache::PriceCache;
use crate::types::{AccountId, ContractId, PairId, PositionSide, Price, Quote};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    FullyOpen,
    PartiallyClosed,
    FullyClosed,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairState::FullyOpen => write!(f, "fully open"),
            PairState::PartiallyClosed => write!(f, "partially closed"),
            PairState::FullyClosed => write!(f, "fully closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedPosition {
    pub pair_id: PairId,
    pub long: Contract,
    pub short: Contract,
    pub state: PairState,
}

impl PairedPosition {
    fn from_legs(pair_id: PairId, legs: Vec<Contract>) -> Result<Self, HedgingError> {
        let count = legs.len();
        let invalid = || HedgingError::InvalidPair { pair_id, legs: count };
        if count != 2 {
            return Err(invalid());
        }
        let mut long = None;
        let mut short = None;
        for leg in legs {
            match leg.side {
                PositionSide::Long => long = Some(leg),
                PositionSide::Short => short = Some(leg),
            }
        }
        let (Some(long), Some(short)) = (long, short) else {
            return Err(invalid());
        };

        let state = match (long.is_open(), short.is_open()) {
            (true, true) => PairState::FullyOpen,
            (false, false) => PairState::FullyClosed,
            _ => PairState::PartiallyClosed,
        };
        Ok(Self {
            pair_id,
            long,
            short,
            state,
        })
    }

    pub fn leg(&self, side: PositionSide) -> &Contract {
        match side {
            PositionSide::Long => &self.long,
            PositionSide::Short => &self.short,
        }
    }
}

/// Result of closing one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegClose {
    pub contract: Contract,
    pub settlement: Settlement,
    pub transaction: TransactionRecord,
    // set when the contract's hedge partner is still open after this close
    pub sibling_still_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairClose {
    pub pair_id: PairId,
    pub long: LegClose,
    pub short: LegClose,
    pub total_credited: Quote,
}

pub struct HedgingManager {
    ledger: Arc<dyn Ledger>,
    prices: Arc<PriceCache>,
    maintenance_fraction: Decimal,
}

impl HedgingManager {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        prices: Arc<PriceCache>,
        risk: &RiskConfig,
    ) -> Result<Self, ConfigError> {
        risk.validate()?;
        Ok(Self {
            ledger,
            prices,
            maintenance_fraction: risk.maintenance_fraction,
        })
    }

    pub fn get_pair(&self, pair_id: PairId) -> Result<PairedPosition, HedgingError> {
        let tx = self.ledger.begin()?;
        PairedPosition::from_legs(pair_id, tx.contracts_by_pair(pair_id)?)
    }

    /// Close one contract at `close_price`, returning margin + pnl - swap
    /// (floored at zero) to the account.
    pub fn close_leg(
        &self,
        contract_id: ContractId,
        close_price: Price,
    ) -> Result<LegClose, HedgingError> {
        let mut tx = self.ledger.begin()?;
        let contract = tx.contract(contract_id)?;
        if !contract.is_open() {
            return Err(HedgingError::NotOpen {
                contract_id,
                status: contract.status,
            });
        }

        let mut closed = settle(
            tx.as_mut(),
            contract,
            close_price,
            TransactionType::PositionClose,
            self.prices.now(),
        )?;

        if let Some(pair_id) = closed.contract.pair_id {
            closed.sibling_still_open = tx
                .contracts_by_pair(pair_id)?
                .iter()
                .any(|c| c.id != contract_id && c.is_open());
        }
        tx.commit()?;

        if closed.sibling_still_open {
            warn!(
                contract = %closed.contract.contract_number,
                pair_id = ?closed.contract.pair_id,
                "hedge now unbalanced: sibling leg still open"
            );
        }
        info!(
            contract = %closed.contract.contract_number,
            close_price = %close_price,
            pnl = %closed.settlement.pnl,
            credited = %closed.settlement.credited,
            "leg closed"
        );
        Ok(closed)
    }

    /// Close both legs at the same price in one transaction. The pair must be fully open.
    pub fn close_pair(
        &self,
        pair_id: PairId,
        close_price: Price,
    ) -> Result<PairClose, HedgingError> {
        let mut tx = self.ledger.begin()?;
        let pair = PairedPosition::from_legs(pair_id, tx.contracts_by_pair(pair_id)?)?;
        if pair.state != PairState::FullyOpen {
            return Err(HedgingError::PairNotFullyOpen {
                pair_id,
                state: pair.state,
            });
        }

        let at = self.prices.now();
        let long = settle(tx.as_mut(), pair.long, close_price, TransactionType::PairClose, at)?;
        let short = settle(tx.as_mut(), pair.short, close_price, TransactionType::PairClose, at)?;
        tx.commit()?;

        let total_credited = long.settlement.credited.add(short.settlement.credited);
        info!(%pair_id, %close_price, %total_credited, "pair closed");
        Ok(PairClose {
            pair_id,
            long,
            short,
            total_credited,
        })
    }

    /// Advisory: does this open contract still cover its maintenance margin?
    /// Uses the cached price for unrealized pnl when a fresh one exists.
    pub fn validate_margin_after_closure(
        &self,
        contract_id: ContractId,
    ) -> Result<MaintenanceCheck, HedgingError> {
        let contract = {
            let tx = self.ledger.begin()?;
            tx.contract(contract_id)?
        };
        if !contract.is_open() {
            return Ok(MaintenanceCheck {
                healthy: false,
                effective_margin: Quote::zero(),
                required: Quote::zero(),
                reason: format!("Contract is not open (current status: {})", contract.status),
            });
        }
        let mark = self.prices.get_fresh(&contract.symbol);
        Ok(check_maintenance(&contract, mark, self.maintenance_fraction))
    }

    /// Balance, used margin and mark-to-market for an account in its own
    /// currency. Contracts without a fresh price count at zero unrealized pnl.
    pub fn account_metrics(&self, account: AccountId) -> Result<AccountMetrics, HedgingError> {
        let (balance, contracts) = {
            let tx = self.ledger.begin()?;
            let currency = tx.account_currency(account)?;
            (tx.balance(account, &currency)?, tx.contracts_by_account(account)?)
        };
        Ok(account_metrics(balance, &contracts, |symbol| {
            self.prices.get_fresh(symbol)
        }))
    }

    /// Every pair the account has a leg in. Pairs that do not have exactly
    /// one long and one short leg are skipped.
    pub fn pairs_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<PairedPosition>, HedgingError> {
        let tx = self.ledger.begin()?;
        let mut pair_ids: Vec<PairId> = Vec::new();
        for contract in tx.contracts_by_account(account)? {
            if let Some(pid) = contract.pair_id {
                if !pair_ids.contains(&pid) {
                    pair_ids.push(pid);
                }
            }
        }

        let mut pairs = Vec::with_capacity(pair_ids.len());
        for pair_id in pair_ids {
            match PairedPosition::from_legs(pair_id, tx.contracts_by_pair(pair_id)?) {
                Ok(pair) => pairs.push(pair),
                Err(e) => debug!(%pair_id, error = %e, "skipping malformed pair"),
            }
        }
        Ok(pairs)
    }
}

impl fmt::Debug for HedgingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingManager")
            .field("maintenance_fraction", &self.maintenance_fraction)
            .finish()
    }
}

// closes an open contract inside `tx`: credit, status, audit record
fn settle(
    tx: &mut (dyn LedgerTx + '_),
    mut contract: Contract,
    close_price: Price,
    tx_type: TransactionType,
    at: crate::types::Timestamp,
) -> Result<LegClose, HedgingError> {
    let settlement = contract.settle_close(close_price);
    let currency = tx.account_currency(contract.account_id)?;
    if settlement.credited.is_positive() {
        tx.credit(contract.account_id, &currency, settlement.credited)?;
    }

    contract.close(close_price, settlement.pnl, at)?;
    tx.update_contract(&contract)?;

    let number = tx.next_number(NumberKind::Transaction)?;
    let transaction =
        TransactionRecord::for_close(number, tx_type, &contract, &currency, &settlement, at);
    tx.record_transaction(transaction.clone())?;

    Ok(LegClose {
        contract,
        settlement,
        transaction,
        sibling_still_open: false,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HedgingError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Pair {pair_id} is malformed: expected one long and one short leg, found {legs} legs")]
    InvalidPair { pair_id: PairId, legs: usize },

    #[error("Contract {contract_id} is not open (current status: {status})")]
    NotOpen {
        contract_id: ContractId,
        status: ContractStatus,
    },

    #[error("Pair {pair_id} is not fully open ({state})")]
    PairNotFullyOpen { pair_id: PairId, state: PairState },
}

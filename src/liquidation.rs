//! Forced closure of breached positions.
//!
//! Driven by price ticks, never polled. For each tick the monitor loads the
//! open contracts for that symbol that carry a liquidation price and closes
//! every one the tick has crossed:
//!
//! - long: `price <= liquidation_price`
//! - short: `price >= liquidation_price`
//!
//! The account gets back `max(0, margin + pnl)`; a loss beyond the margin is
//! absorbed by the broker and never debited. Each position is liquidated in
//! its own transaction, so one failure does not stop the rest of the batch.
//!
//! Ticks for one symbol are serialized and applied in sequence order; a tick
//! older than the last one applied for its symbol is dropped. Different
//! symbols do not contend.

use crate::audit::{TransactionRecord, TransactionType};
use crate::ledger::{Ledger, LedgerError, NumberKind};
use crate::position::{Contract, PositionError, Settlement};
use crate::price_cache::{PriceCache, PriceTick};
use crate::types::{ContractId, Price, Quote};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidatedPosition {
    pub contract: Contract,
    pub settlement: Settlement,
    pub transaction: TransactionRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLiquidation {
    pub contract_id: ContractId,
    pub error: LiquidationError,
}

/// Outcome of one pass over a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationReport {
    pub symbol: String,
    pub price: Price,
    // open contracts with a liquidation price
    pub checked: usize,
    pub liquidated: Vec<LiquidatedPosition>,
    pub failed: Vec<FailedLiquidation>,
}

impl LiquidationReport {
    pub fn total_credited(&self) -> Quote {
        self.liquidated.iter().map(|l| l.settlement.credited).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct LiquidationMonitor {
    ledger: Arc<dyn Ledger>,
    prices: Arc<PriceCache>,
    // per-symbol gate holding the last applied tick sequence
    gates: DashMap<String, Arc<Mutex<u64>>>,
}

impl LiquidationMonitor {
    pub fn new(ledger: Arc<dyn Ledger>, prices: Arc<PriceCache>) -> Self {
        Self {
            ledger,
            prices,
            gates: DashMap::new(),
        }
    }

    /// Entry point for the market-data consumer, called after `PriceCache::update`.
    /// Returns `None` when the tick was older than one already applied.
    pub fn handle_tick(
        &self,
        tick: &PriceTick,
    ) -> Result<Option<LiquidationReport>, LiquidationError> {
        let gate = self.gate(&tick.symbol);
        let mut last_seq = gate.lock();
        if tick.seq <= *last_seq {
            debug!(
                symbol = %tick.symbol,
                seq = tick.seq,
                last_seq = *last_seq,
                "skipping out-of-order tick"
            );
            return Ok(None);
        }

        let report = self.check_liquidations(&tick.symbol, tick.price)?;
        *last_seq = tick.seq;
        Ok(Some(report))
    }

    /// Liquidate every open contract on `symbol` that `price` has breached.
    ///
    /// Only a failure to load the candidates is an error. Per-position failures
    /// are logged and listed in [`LiquidationReport::failed`].
    pub fn check_liquidations(
        &self,
        symbol: &str,
        price: Price,
    ) -> Result<LiquidationReport, LiquidationError> {
        let candidates = {
            let tx = self.ledger.begin()?;
            tx.open_contracts_for_symbol(symbol)?
        };

        let mut report = LiquidationReport {
            symbol: symbol.to_string(),
            price,
            checked: candidates.len(),
            liquidated: Vec::new(),
            failed: Vec::new(),
        };

        for contract in candidates.iter().filter(|c| c.is_breached(price)) {
            match self.liquidate(contract.id, price) {
                Ok(Some(done)) => report.liquidated.push(done),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        contract = %contract.contract_number,
                        %symbol,
                        error = %e,
                        "liquidation failed"
                    );
                    report.failed.push(FailedLiquidation {
                        contract_id: contract.id,
                        error: e,
                    });
                }
            }
        }

        if !report.liquidated.is_empty() {
            info!(
                %symbol,
                %price,
                checked = report.checked,
                liquidated = report.liquidated.len(),
                failed = report.failed.len(),
                "liquidation pass complete"
            );
        }
        Ok(report)
    }

    // one contract, one transaction. re-reads the row so a concurrent close wins.
    fn liquidate(
        &self,
        contract_id: ContractId,
        price: Price,
    ) -> Result<Option<LiquidatedPosition>, LiquidationError> {
        let mut tx = self.ledger.begin()?;
        let mut contract = tx.contract(contract_id)?;
        if !contract.is_open() || !contract.is_breached(price) {
            debug!(
                contract = %contract.contract_number,
                status = %contract.status,
                "no longer liquidatable"
            );
            return Ok(None);
        }

        let at = self.prices.now();
        let settlement = contract.settle_liquidation(price);
        let currency = tx.account_currency(contract.account_id)?;
        if settlement.credited.is_positive() {
            tx.credit(contract.account_id, &currency, settlement.credited)?;
        }

        contract.liquidate(price, settlement.pnl, at)?;
        tx.update_contract(&contract)?;

        let number = tx.next_number(NumberKind::Transaction)?;
        let transaction = TransactionRecord::for_close(
            number,
            TransactionType::Liquidation,
            &contract,
            &currency,
            &settlement,
            at,
        );
        tx.record_transaction(transaction.clone())?;
        tx.commit()?;

        if settlement.total_return.is_negative() {
            warn!(
                contract = %contract.contract_number,
                shortfall = %settlement.total_return.abs(),
                "loss exceeded margin, absorbed by broker"
            );
        }
        info!(
            contract = %contract.contract_number,
            side = %contract.side,
            %price,
            liquidation_price = ?contract.liquidation_price,
            pnl = %settlement.pnl,
            credited = %settlement.credited,
            "position liquidated"
        );

        Ok(Some(LiquidatedPosition {
            contract,
            settlement,
            transaction,
        }))
    }

    fn gate(&self, symbol: &str) -> Arc<Mutex<u64>> {
        if let Some(gate) = self.gates.get(symbol) {
            return Arc::clone(gate.value());
        }
        Arc::clone(
            self.gates
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(0)))
                .value(),
        )
    }
}

impl fmt::Debug for LiquidationMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiquidationMonitor")
            .field("symbols", &self.gates.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiquidationError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),
}

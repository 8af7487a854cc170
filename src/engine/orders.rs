//! Order execution entry points and the spot path.
//!
//! `execute` claims the order, opens one ledger transaction, and dispatches on
//! the instrument's [`ExecutionKind`]. A successful fill commits the
//! transaction. A rejection or hard failure drops it, so nothing the path
//! wrote becomes visible.

use super::core::Engine;
use super::results::{EngineError, ExecutionResult, Halt, Rejection};
use crate::account::{resolve_funding, FundingSource};
use crate::instrument::ExecutionKind;
use crate::ledger::{ExecutionContext, LedgerTx};
use crate::margin::{notional_value, taker_fee};
use crate::order::{evaluate_trigger, ExecutionStrategy, Order, TriggerCheck};
use crate::types::{AccountId, Leverage, OrderId, OrderSide, Price, Quote};
use tracing::{error, info};

impl Engine {
    /// Fill a pending order at `execution_price`.
    ///
    /// Soft failures come back as `Ok` with `success == false` and the order
    /// untouched. `Err` means a hard failure with nothing committed.
    pub fn execute(
        &self,
        order_id: OrderId,
        execution_price: Price,
    ) -> Result<ExecutionResult, EngineError> {
        let result = self.execute_locked(order_id, execution_price);
        match &result {
            Ok(r) => self.log_outcome(r),
            Err(e) => error!(%order_id, error = %e, "order execution failed"),
        }
        result
    }

    fn execute_locked(
        &self,
        order_id: OrderId,
        price: Price,
    ) -> Result<ExecutionResult, EngineError> {
        // held until the transaction is done
        let _claim = self.ledger.lock_order_for_execution(order_id)?;
        let mut tx = self.ledger.begin()?;

        let ExecutionContext {
            order,
            account_currency,
            instrument,
        } = tx.load_execution_context(order_id)?;

        if !order.is_pending() {
            return Ok(ExecutionResult::rejected(
                order.clone(),
                Rejection::NotPending {
                    status: order.status,
                },
            ));
        }

        let kind = instrument.execution_kind(order.product_type, &self.config.risk)?;
        let mut working = order.clone();
        let outcome = match kind {
            ExecutionKind::Spot {
                base_currency,
                quote_currency,
            } => self.fill_spot(
                tx.as_mut(),
                &mut working,
                price,
                &base_currency,
                &quote_currency,
            ),
            ExecutionKind::SingleLeverage { max_leverage } => {
                check_leverage(&working, max_leverage).map_err(Halt::from).and_then(|lev| {
                    self.open_single(tx.as_mut(), &mut working, price, &account_currency, lev)
                })
            }
            ExecutionKind::DualLeverage { max_leverage } => check_leverage(&working, max_leverage)
                .map_err(Halt::from)
                .and_then(|lev| {
                    self.route_leveraged(tx.as_mut(), &mut working, price, &account_currency, lev)
                }),
        };

        match outcome {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(Halt::Rejected(rejection)) => Ok(ExecutionResult::rejected(order, rejection)),
            Err(Halt::Failed(e)) => Err(e),
        }
    }

    // hedged products: ask routing, then book internally or via an LP
    fn route_leveraged(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &mut Order,
        price: Price,
        account_currency: &str,
        leverage: Leverage,
    ) -> Result<ExecutionResult, Halt> {
        let decision = self.routing.decide(
            &*tx,
            &order.symbol,
            order.side,
            order.amount_base,
            price,
        );

        let mut result = if decision.route_to_lp {
            self.execute_external(tx, order, price, account_currency, leverage)?
        } else {
            order.execution_strategy = Some(ExecutionStrategy::InternalBook);
            let mut opened = self.open_dual_at(tx, order, price, account_currency, leverage)?;
            opened.strategy = Some(ExecutionStrategy::InternalBook);
            opened
        };
        result.routing = Some(decision);
        Ok(result)
    }

    // 3.2: spot is a balance swap, no positions
    fn fill_spot(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &mut Order,
        price: Price,
        base_currency: &str,
        quote_currency: &str,
    ) -> Result<ExecutionResult, Halt> {
        let account = order.account_id;
        let notional = notional_value(order.amount_base, price);
        let fee = taker_fee(notional, &self.config.fees);
        let amount = Quote::new(order.amount_base);

        let (funded_from, settled_to) = match order.side {
            OrderSide::Buy => {
                let source = self.fund(tx, account, quote_currency, notional.add(fee))?;
                tx.credit(account, base_currency, amount)?;
                (source.currency, base_currency.to_string())
            }
            OrderSide::Sell => {
                let source = self.fund(tx, account, base_currency, amount)?;
                let target = self.resolve(tx, account, quote_currency)?;
                tx.credit(account, &target.currency, notional.sub(fee))?;
                (source.currency, target.currency)
            }
        };

        order.mark_filled(order.amount_base, price, self.now());
        tx.update_order(order)?;

        let mut result = ExecutionResult::filled(
            order.clone(),
            format!(
                "Order executed successfully at price {price} with fee {} {quote_currency}",
                fee.value().normalize()
            ),
        );
        result.funding_currency = Some(funded_from);
        result.settlement_currency = Some(settled_to);
        Ok(result)
    }

    pub(super) fn resolve(
        &self,
        tx: &(dyn LedgerTx + '_),
        account: AccountId,
        currency: &str,
    ) -> Result<FundingSource, Halt> {
        let source = resolve_funding(currency, &self.config.currency_equivalence, |c| {
            tx.balance(account, c).map(|q| q.value())
        })?;
        Ok(source)
    }

    /// Picks the funding balance, checks it covers `required`, and debits it.
    pub(super) fn fund(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        account: AccountId,
        currency: &str,
        required: Quote,
    ) -> Result<FundingSource, Halt> {
        let source = self.resolve(tx, account, currency)?;
        if source.available < required.value() {
            return Err(Rejection::InsufficientFunds {
                currency: source.currency,
                required,
                available: Quote::new(source.available),
            }
            .into());
        }
        tx.debit(account, &source.currency, required)?;
        Ok(source)
    }

    /// Whether the order may fill at `current_price` right now.
    pub fn validate_trigger(
        &self,
        order_id: OrderId,
        current_price: Price,
    ) -> Result<TriggerCheck, EngineError> {
        let order = self.load_order(order_id)?;
        Ok(trigger_for(&order, current_price))
    }

    /// Execute at the cached market price, if the price is fresh and the
    /// order's trigger condition holds there.
    pub fn execute_at_market(&self, order_id: OrderId) -> Result<ExecutionResult, EngineError> {
        let order = self.load_order(order_id)?;

        let price = match self.prices.get(&order.symbol) {
            Ok(price) => price,
            Err(e) => {
                let result = ExecutionResult::rejected(
                    order.clone(),
                    Rejection::NoMarketPrice {
                        symbol: order.symbol.clone(),
                        cause: e.to_string(),
                    },
                );
                self.log_outcome(&result);
                return Ok(result);
            }
        };

        let check = trigger_for(&order, price);
        if !check.triggered {
            let result =
                ExecutionResult::rejected(order, Rejection::TriggerNotMet { reason: check.reason });
            self.log_outcome(&result);
            return Ok(result);
        }

        self.execute(order_id, price)
    }

    /// One structured log line per execution result.
    pub fn log_outcome(&self, result: &ExecutionResult) {
        let order = &result.order;
        if result.success {
            info!(
                order_id = %order.id,
                order_number = %order.order_number,
                symbol = %order.symbol,
                side = %order.side,
                amount = %order.amount_base,
                price = ?order.average_fill_price.map(|p| p.value()),
                strategy = ?result.strategy.map(|s| s.to_string()),
                contracts = result.contracts.len(),
                funding_currency = ?result.funding_currency,
                message = %result.message,
                "order filled"
            );
        } else {
            info!(
                order_id = %order.id,
                order_number = %order.order_number,
                symbol = %order.symbol,
                status = %order.status,
                reason = %result.message,
                "order not filled"
            );
        }
    }

    fn load_order(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let tx = self.ledger.begin()?;
        Ok(tx.load_execution_context(order_id)?.order)
    }
}

fn trigger_for(order: &Order, price: Price) -> TriggerCheck {
    if !order.is_pending() {
        return TriggerCheck {
            triggered: false,
            reason: format!("order is not pending (current status: {})", order.status),
        };
    }
    evaluate_trigger(order, price)
}

// requested leverage below 1 counts as 1x; above the cap is a rejection
pub(super) fn check_leverage(order: &Order, max: Leverage) -> Result<Leverage, Rejection> {
    let requested = Leverage::from_requested(order.leverage);
    if requested > max {
        return Err(Rejection::LeverageExceeded { requested, max });
    }
    Ok(requested)
}

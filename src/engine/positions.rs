// 3.3 engine/positions.rs: leveraged opens.
// single: one contract on the order's side, full fee on it.
// dual: long + short sharing a pair id, fee split across the legs, 2x per-leg margin debited once.

use super::core::Engine;
use super::results::{ExecutionResult, Halt};
use crate::ledger::{LedgerTx, NumberKind};
use crate::margin::{dual_margin, liquidation_price, notional_value, single_margin, taker_fee};
use crate::order::Order;
use crate::position::{Contract, OpenParams};
use crate::types::{Leverage, PairId, PositionSide, Price, Quote};
use tracing::debug;

impl Engine {
    pub(super) fn open_single(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &mut Order,
        price: Price,
        account_currency: &str,
        leverage: Leverage,
    ) -> Result<ExecutionResult, Halt> {
        let notional = notional_value(order.amount_base, price);
        let fee = taker_fee(notional, &self.config.fees);
        let margin = single_margin(notional, fee, leverage);

        let source = self.fund(tx, order.account_id, account_currency, margin.required)?;

        let side = order.side.position_side();
        let contract = self.new_contract(
            tx,
            order,
            side,
            price,
            leverage,
            margin.margin_used,
            margin.commission,
            None,
        )?;
        tx.insert_contract(contract.clone())?;

        order.mark_filled(order.amount_base, price, self.now());
        tx.update_order(order)?;

        debug!(
            order_number = %order.order_number,
            contract = %contract.contract_number,
            %side,
            %leverage,
            "single position opened"
        );

        let mut result = ExecutionResult::filled(
            order.clone(),
            format!(
                "Position opened: {} {} at price {price}",
                side.to_string().to_uppercase(),
                contract.contract_number
            ),
        );
        result.contracts = vec![contract];
        result.funding_currency = Some(source.currency);
        Ok(result)
    }

    /// Both legs and the full debit land in the caller's transaction, so
    /// either all of it commits or none of it does.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn open_dual(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &mut Order,
        price: Price,
        notional: Quote,
        fee: Quote,
        account_currency: &str,
        leverage: Leverage,
    ) -> Result<ExecutionResult, Halt> {
        let margin = dual_margin(notional, fee, leverage);
        let source = self.fund(tx, order.account_id, account_currency, margin.total)?;

        let pair_id = PairId::new();
        let mut legs = Vec::with_capacity(2);
        for side in [PositionSide::Long, PositionSide::Short] {
            let leg = self.new_contract(
                tx,
                order,
                side,
                price,
                leverage,
                margin.margin_used_per_leg,
                margin.commission_per_leg,
                Some(pair_id),
            )?;
            tx.insert_contract(leg.clone())?;
            legs.push(leg);
        }

        order.pair_id = Some(pair_id);
        order.mark_filled(order.amount_base, price, self.now());
        tx.update_order(order)?;

        let message = format!(
            "Hedged position opened: LONG {} and SHORT {} at price {price} (pair_id: {pair_id})",
            legs[0].contract_number, legs[1].contract_number
        );
        debug!(
            order_number = %order.order_number,
            %pair_id,
            total_margin = %margin.total,
            "hedged pair opened"
        );

        let mut result = ExecutionResult::filled(order.clone(), message);
        result.contracts = legs;
        result.pair_id = Some(pair_id);
        result.funding_currency = Some(source.currency);
        Ok(result)
    }

    // hedged open sized from the order at `price`
    pub(super) fn open_dual_at(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &mut Order,
        price: Price,
        account_currency: &str,
        leverage: Leverage,
    ) -> Result<ExecutionResult, Halt> {
        let notional = notional_value(order.amount_base, price);
        let fee = taker_fee(notional, &self.config.fees);
        self.open_dual(tx, order, price, notional, fee, account_currency, leverage)
    }

    #[allow(clippy::too_many_arguments)]
    fn new_contract(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &Order,
        side: PositionSide,
        price: Price,
        leverage: Leverage,
        margin_used: Quote,
        commission: Quote,
        pair_id: Option<PairId>,
    ) -> Result<Contract, Halt> {
        let contract_number = tx.next_number(NumberKind::Contract)?;
        Ok(Contract::open(OpenParams {
            account_id: order.account_id,
            symbol: order.symbol.clone(),
            contract_number,
            side,
            size: order.amount_base,
            entry_price: price,
            margin_used,
            leverage,
            liquidation_price: liquidation_price(
                price,
                leverage,
                side,
                self.config.risk.liquidation_buffer,
            ),
            commission,
            pair_id,
            opened_at: self.now(),
        }))
    }
}

// 3.4 engine/external.rs: A-book path. fill at an LP, record the route, then mirror the
// exposure internally with the same hedged pair at the LP's fill price.
// an LP failure (both providers) rejects the order; the route record is only written after a fill.

use super::core::Engine;
use super::results::{ExecutionResult, Halt, Rejection};
use crate::audit::{LpRoute, LpRouteStatus};
use crate::ledger::LedgerTx;
use crate::lp::LpOrderRequest;
use crate::order::{ExecutionStrategy, Order};
use crate::types::{Leverage, Price};
use tracing::info;

impl Engine {
    pub(super) fn execute_external(
        &self,
        tx: &mut (dyn LedgerTx + '_),
        order: &mut Order,
        price: Price,
        account_currency: &str,
        leverage: Leverage,
    ) -> Result<ExecutionResult, Halt> {
        let routing = self.routing.current_config();
        let request = LpOrderRequest {
            order_id: order.id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.amount_base,
            reference_price: price,
        };

        let (report, provider) = self
            .providers
            .execute_with_failover(&routing.primary_lp, routing.fallback_lp.as_deref(), &request)
            .map_err(|e| Rejection::LpRejected {
                reason: e.to_string(),
            })?;

        let route = LpRoute {
            order_id: order.id,
            provider: provider.clone(),
            external_order_id: report.lp_order_id.clone(),
            fill_price: report.average_price,
            fill_quantity: report.filled_quantity,
            fee: report.fee,
            status: LpRouteStatus::Filled,
            routed_at: self.now(),
        };
        tx.record_lp_route(route.clone())?;
        order.execution_strategy = Some(ExecutionStrategy::ExternalLp);

        info!(
            order_number = %order.order_number,
            %provider,
            lp_order_id = %report.lp_order_id,
            fill_price = %report.average_price,
            "order filled at LP"
        );

        let mut result =
            self.open_dual_at(tx, order, report.average_price, account_currency, leverage)?;
        result.message = format!("A-Book execution: {provider} - {}", result.message);
        result.lp_route = Some(route);
        result.strategy = Some(ExecutionStrategy::ExternalLp);
        Ok(result)
    }
}

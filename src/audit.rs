// 8.0: audit trail. every close and liquidation writes a TransactionRecord in the same
// transaction that moves the money. A-book fills also leave an LpRoute behind.

use crate::position::{Contract, Settlement};
use crate::types::{
    AccountId, ContractId, Leverage, OrderId, PairId, PositionSide, Price, Quote, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    PositionClose,
    PairClose,
    Liquidation,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::PositionClose => write!(f, "position_close"),
            TransactionType::PairClose => write!(f, "pair_close"),
            TransactionType::Liquidation => write!(f, "liquidation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_number: String,
    pub tx_type: TransactionType,
    pub account_id: AccountId,
    pub contract_id: ContractId,
    pub contract_number: String,
    pub pair_id: Option<PairId>,
    pub currency: String,
    // amount actually credited to the balance
    pub credited: Quote,
    pub details: CloseDetails,
    pub created_at: Timestamp,
}

// snapshot of the position at close time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseDetails {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Price,
    pub close_price: Price,
    pub leverage: Leverage,
    pub margin_used: Quote,
    pub pnl: Quote,
    pub swap: Quote,
    pub commission: Quote,
    // before flooring
    pub total_return: Quote,
}

impl TransactionRecord {
    pub fn for_close(
        transaction_number: String,
        tx_type: TransactionType,
        contract: &Contract,
        currency: &str,
        settlement: &Settlement,
        at: Timestamp,
    ) -> Self {
        Self {
            transaction_number,
            tx_type,
            account_id: contract.account_id,
            contract_id: contract.id,
            contract_number: contract.contract_number.clone(),
            pair_id: contract.pair_id,
            currency: currency.to_string(),
            credited: settlement.credited,
            details: CloseDetails {
                symbol: contract.symbol.clone(),
                side: contract.side,
                size: contract.size,
                entry_price: contract.entry_price,
                close_price: settlement.close_price,
                leverage: contract.leverage,
                margin_used: contract.margin_used,
                pnl: settlement.pnl,
                swap: contract.swap,
                commission: contract.commission,
                total_return: settlement.total_return,
            },
            created_at: at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpRouteStatus {
    Filled,
}

/// Record of an order mirrored at an external liquidity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpRoute {
    pub order_id: OrderId,
    pub provider: String,
    pub external_order_id: String,
    pub fill_price: Price,
    pub fill_quantity: Decimal,
    pub fee: Quote,
    pub status: LpRouteStatus,
    pub routed_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::OpenParams;
    use rust_decimal_macros::dec;

    #[test]
    fn close_record_keeps_unfloored_return() {
        let contract = Contract::open(OpenParams {
            account_id: AccountId::new(),
            symbol: "BTCUSDT".to_string(),
            contract_number: "CT-7".to_string(),
            side: PositionSide::Long,
            size: dec!(1),
            entry_price: Price::new_unchecked(dec!(100)),
            margin_used: Quote::new(dec!(10)),
            leverage: Leverage::new(10).unwrap(),
            liquidation_price: Price::new_unchecked(dec!(91)),
            commission: Quote::new(dec!(0.05)),
            pair_id: Some(PairId::new()),
            opened_at: Timestamp::from_millis(0),
        });

        let settlement = contract.settle_liquidation(Price::new_unchecked(dec!(85)));
        let record = TransactionRecord::for_close(
            "TX-1".to_string(),
            TransactionType::Liquidation,
            &contract,
            "USDT",
            &settlement,
            Timestamp::from_millis(10),
        );

        assert_eq!(record.details.pnl.value(), dec!(-15));
        assert_eq!(record.details.total_return.value(), dec!(-5));
        assert_eq!(record.credited, Quote::zero());
        assert_eq!(record.pair_id, contract.pair_id);
        assert_eq!(record.tx_type.to_string(), "liquidation");
    }
}

// 4.0: leveraged positions (contracts). pnl = side * size * (price - entry).
// 4.1 has the close/liquidate transitions at the bottom. open is the only non-terminal state.

use crate::types::{AccountId, ContractId, Leverage, PairId, PositionSide, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Open,
    Closed,
    Liquidated,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractStatus::Open => write!(f, "open"),
            ContractStatus::Closed => write!(f, "closed"),
            ContractStatus::Liquidated => write!(f, "liquidated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub account_id: AccountId,
    pub symbol: String,
    pub contract_number: String,
    pub side: PositionSide,
    pub status: ContractStatus,
    // lot size in base asset
    pub size: Decimal,
    pub entry_price: Price,
    pub margin_used: Quote,
    pub leverage: Leverage,
    pub liquidation_price: Option<Price>,
    pub tp_price: Option<Price>,
    pub sl_price: Option<Price>,
    pub close_price: Option<Price>,
    pub pnl: Option<Quote>,
    pub swap: Quote,
    pub commission: Quote,
    pub pair_id: Option<PairId>,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

/// Everything needed to open a contract. The ledger assigns nothing; ids and
/// numbers are chosen by the caller inside the opening transaction.
#[derive(Debug, Clone)]
pub struct OpenParams {
    pub account_id: AccountId,
    pub symbol: String,
    pub contract_number: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Price,
    pub margin_used: Quote,
    pub leverage: Leverage,
    pub liquidation_price: Price,
    pub commission: Quote,
    pub pair_id: Option<PairId>,
    pub opened_at: Timestamp,
}

impl Contract {
    pub fn open(params: OpenParams) -> Self {
        Self {
            id: ContractId::new(),
            account_id: params.account_id,
            symbol: params.symbol,
            contract_number: params.contract_number,
            side: params.side,
            status: ContractStatus::Open,
            size: params.size,
            entry_price: params.entry_price,
            margin_used: params.margin_used,
            leverage: params.leverage,
            liquidation_price: Some(params.liquidation_price),
            tp_price: None,
            sl_price: None,
            close_price: None,
            pnl: None,
            swap: Quote::zero(),
            commission: params.commission,
            pair_id: params.pair_id,
            opened_at: params.opened_at,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ContractStatus::Open
    }

    // 4.2: profit or loss if closed at `price`
    pub fn pnl_at(&self, price: Price) -> Quote {
        calculate_pnl(self.side, self.size, self.entry_price, price)
    }

    /// Amount owed back to the account on close: margin + pnl - swap.
    /// May be negative; callers decide how to floor it.
    pub fn total_return(&self, close_price: Price) -> Quote {
        self.margin_used
            .add(self.pnl_at(close_price))
            .sub(self.swap)
    }

    // 4.4: voluntary close. swap is charged, the credit is floored at zero.
    pub fn settle_close(&self, close_price: Price) -> Settlement {
        let total_return = self.total_return(close_price);
        Settlement {
            close_price,
            pnl: self.pnl_at(close_price),
            total_return,
            credited: total_return.floor_zero(),
        }
    }

    // 4.5: forced close. whatever margin is left after pnl, never below zero
    pub fn settle_liquidation(&self, close_price: Price) -> Settlement {
        let pnl = self.pnl_at(close_price);
        let total_return = self.margin_used.add(pnl);
        Settlement {
            close_price,
            pnl,
            total_return,
            credited: total_return.floor_zero(),
        }
    }

    pub fn entry_value(&self) -> Quote {
        Quote::new(self.size * self.entry_price.value())
    }

    // + for long, - for short. feeds net exposure
    pub fn signed_exposure(&self) -> Decimal {
        self.side.sign() * self.entry_value().value()
    }

    // long breaches at or below its liquidation price, short at or above
    pub fn is_breached(&self, current: Price) -> bool {
        match self.liquidation_price {
            None => false,
            Some(liq) => match self.side {
                PositionSide::Long => current <= liq,
                PositionSide::Short => current >= liq,
            },
        }
    }

    // 4.1: terminal transitions. only an open contract may move.
    pub fn close(&mut self, price: Price, pnl: Quote, at: Timestamp) -> Result<(), PositionError> {
        self.finish(ContractStatus::Closed, price, pnl, at)
    }

    pub fn liquidate(
        &mut self,
        price: Price,
        pnl: Quote,
        at: Timestamp,
    ) -> Result<(), PositionError> {
        self.finish(ContractStatus::Liquidated, price, pnl, at)
    }

    fn finish(
        &mut self,
        status: ContractStatus,
        price: Price,
        pnl: Quote,
        at: Timestamp,
    ) -> Result<(), PositionError> {
        if !self.is_open() {
            return Err(PositionError::NotOpen {
                id: self.id,
                status: self.status,
            });
        }
        self.status = status;
        self.close_price = Some(price);
        self.pnl = Some(pnl);
        self.closed_at = Some(at);
        Ok(())
    }
}

/// Money side of a close: what the position made and what goes back to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub close_price: Price,
    pub pnl: Quote,
    // before flooring
    pub total_return: Quote,
    pub credited: Quote,
}

// 4.3: the pnl formula. long: (close - entry) * size, short: (entry - close) * size
pub fn calculate_pnl(side: PositionSide, size: Decimal, entry: Price, close: Price) -> Quote {
    Quote::new(side.sign() * size * (close.value() - entry.value()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Contract {id} is not open (current status: {status})")]
    NotOpen { id: ContractId, status: ContractStatus },
}

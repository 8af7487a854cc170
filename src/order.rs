// 2.0: order intents. created by external intake, mutated only by the execution engine.
// 2.1 trigger evaluation for limit / stop / stop-limit sits at the bottom.

use crate::types::{AccountId, OrderId, OrderSide, PairId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Spot,
    Forex,
    Cfd,
    Futures,
    Options,
}

// B-book keeps exposure internal, A-book mirrors it at an external LP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    InternalBook,
    ExternalLp,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::InternalBook => write!(f, "b_book"),
            ExecutionStrategy::ExternalLp => write!(f, "a_book"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub order_number: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount_base: Decimal,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    // raw requested leverage, clamped to >= 1 at execution
    pub leverage: u32,
    pub product_type: ProductType,
    pub status: OrderStatus,
    pub filled_amount: Decimal,
    pub average_fill_price: Option<Price>,
    pub pair_id: Option<PairId>,
    pub execution_strategy: Option<ExecutionStrategy>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    pub fn market(
        account_id: AccountId,
        symbol: &str,
        side: OrderSide,
        amount_base: Decimal,
        leverage: u32,
        product_type: ProductType,
    ) -> Self {
        let now = Timestamp::now();
        let id = OrderId::new();
        Self {
            id,
            account_id,
            order_number: format!("ORD-{}", &id.0.simple().to_string()[..8]),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            amount_base,
            limit_price: None,
            stop_price: None,
            leverage,
            product_type,
            status: OrderStatus::Pending,
            filled_amount: Decimal::ZERO,
            average_fill_price: None,
            pair_id: None,
            execution_strategy: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_limit(mut self, limit: Price) -> Self {
        self.order_type = OrderType::Limit;
        self.limit_price = Some(limit);
        self
    }

    pub fn with_stop(mut self, stop: Price) -> Self {
        self.order_type = OrderType::Stop;
        self.stop_price = Some(stop);
        self
    }

    pub fn with_stop_limit(mut self, stop: Price, limit: Price) -> Self {
        self.order_type = OrderType::StopLimit;
        self.stop_price = Some(stop);
        self.limit_price = Some(limit);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn mark_filled(&mut self, amount: Decimal, price: Price, at: Timestamp) {
        self.status = OrderStatus::Filled;
        self.filled_amount = amount;
        self.average_fill_price = Some(price);
        self.updated_at = at;
    }
}

/// Outcome of checking whether an order may fill at a given market price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerCheck {
    pub triggered: bool,
    pub reason: String,
}

impl TriggerCheck {
    fn hit(reason: &str) -> Self {
        Self {
            triggered: true,
            reason: reason.to_string(),
        }
    }

    fn miss(reason: String) -> Self {
        Self {
            triggered: false,
            reason,
        }
    }
}

// 2.1: buy limit fills at or below the limit, sell limit at or above.
// stops are the mirror image. stop-limit needs the stop hit first, then the limit.
pub fn evaluate_trigger(order: &Order, current: Price) -> TriggerCheck {
    let px = current.value();
    let side = order.side;

    let limit_ok = |limit: Price| match side {
        OrderSide::Buy => px <= limit.value(),
        OrderSide::Sell => px >= limit.value(),
    };
    let stop_ok = |stop: Price| match side {
        OrderSide::Buy => px >= stop.value(),
        OrderSide::Sell => px <= stop.value(),
    };

    match order.order_type {
        OrderType::Market => TriggerCheck::hit("market order"),
        OrderType::Limit => match order.limit_price {
            None => TriggerCheck::miss("limit price not set".to_string()),
            Some(limit) if limit_ok(limit) => TriggerCheck::hit(match side {
                OrderSide::Buy => "buy limit triggered",
                OrderSide::Sell => "sell limit triggered",
            }),
            Some(limit) => TriggerCheck::miss(format!(
                "limit price not reached (current: {px}, limit: {limit})"
            )),
        },
        OrderType::Stop => match order.stop_price {
            None => TriggerCheck::miss("stop price not set".to_string()),
            Some(stop) if stop_ok(stop) => TriggerCheck::hit(match side {
                OrderSide::Buy => "buy stop triggered",
                OrderSide::Sell => "sell stop triggered",
            }),
            Some(stop) => TriggerCheck::miss(format!(
                "stop price not reached (current: {px}, stop: {stop})"
            )),
        },
        OrderType::StopLimit => match (order.stop_price, order.limit_price) {
            (Some(stop), Some(limit)) => {
                if !stop_ok(stop) {
                    TriggerCheck::miss("stop not triggered yet".to_string())
                } else if limit_ok(limit) {
                    TriggerCheck::hit(match side {
                        OrderSide::Buy => "stop-limit buy triggered",
                        OrderSide::Sell => "stop-limit sell triggered",
                    })
                } else {
                    TriggerCheck::miss("stop triggered but limit not met".to_string())
                }
            }
            _ => TriggerCheck::miss("stop price or limit price not set".to_string()),
        },
    }
}

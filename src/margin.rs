//! Fee and margin math for opening, holding and liquidating positions.
//!
//! Initial margin is notional divided by leverage. The taker fee is charged
//! on top: a single-position open pays the whole fee, a hedged open splits it
//! evenly across its two legs. Maintenance margin is a fraction (default 50%)
//! of the leverage-implied initial margin.
//!
//! The liquidation price puts the forced close a configurable buffer before
//! the zero-equity point: `ratio = (1 / leverage) * buffer`, long at
//! `entry * (1 - ratio)`, short at `entry * (1 + ratio)`.

use crate::config::FeeConfig;
use crate::position::Contract;
use crate::types::{Leverage, PositionSide, Price, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub fn notional_value(size: Decimal, price: Price) -> Quote {
    Quote::new(size.abs() * price.value())
}

pub fn taker_fee(notional: Quote, fees: &FeeConfig) -> Quote {
    notional.mul(fees.taker_rate())
}

/// Margin for one leveraged open on a single position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleMargin {
    // debited from the account
    pub required: Quote,
    // locked on the contract
    pub margin_used: Quote,
    pub commission: Quote,
}

pub fn single_margin(notional: Quote, fee: Quote, leverage: Leverage) -> SingleMargin {
    let margin_used = notional.mul(leverage.initial_margin_fraction());
    SingleMargin {
        required: margin_used.add(fee),
        margin_used,
        commission: fee,
    }
}

/// Margin for a hedged open. Each leg carries half the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualMargin {
    pub per_leg: Quote,
    pub total: Quote,
    pub margin_used_per_leg: Quote,
    pub commission_per_leg: Quote,
}

pub fn dual_margin(notional: Quote, fee: Quote, leverage: Leverage) -> DualMargin {
    let margin_used_per_leg = notional.mul(leverage.initial_margin_fraction());
    let commission_per_leg = fee.mul(dec!(0.5));
    let per_leg = margin_used_per_leg.add(commission_per_leg);
    DualMargin {
        per_leg,
        total: per_leg.mul(dec!(2)),
        margin_used_per_leg,
        commission_per_leg,
    }
}

pub fn liquidation_margin_ratio(leverage: Leverage, buffer: Decimal) -> Decimal {
    leverage.initial_margin_fraction() * buffer
}

pub fn liquidation_price(
    entry: Price,
    leverage: Leverage,
    side: PositionSide,
    buffer: Decimal,
) -> Price {
    let ratio = liquidation_margin_ratio(leverage, buffer);
    let factor = match side {
        PositionSide::Long => Decimal::ONE - ratio,
        PositionSide::Short => Decimal::ONE + ratio,
    };
    // buffer < 1 and leverage >= 1 keep the long factor positive
    Price::new_unchecked(entry.value() * factor)
}

/// Maintenance requirement for an open contract.
pub fn maintenance_margin(contract: &Contract, maintenance_fraction: Decimal) -> Quote {
    contract
        .entry_value()
        .mul(contract.leverage.initial_margin_fraction())
        .mul(maintenance_fraction)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceCheck {
    pub healthy: bool,
    pub effective_margin: Quote,
    pub required: Quote,
    pub reason: String,
}

// effective margin is locked margin plus unrealized pnl when a mark is known
pub fn check_maintenance(
    contract: &Contract,
    mark: Option<Price>,
    maintenance_fraction: Decimal,
) -> MaintenanceCheck {
    let required = maintenance_margin(contract, maintenance_fraction);
    let unrealized = mark.map(|p| contract.pnl_at(p)).unwrap_or_else(Quote::zero);
    let effective_margin = contract.margin_used.add(unrealized);
    let healthy = effective_margin >= required;
    let reason = if healthy {
        format!("Margin {effective_margin} covers maintenance requirement {required}")
    } else {
        format!("Margin {effective_margin} below maintenance requirement {required}")
    };
    MaintenanceCheck {
        healthy,
        effective_margin,
        required,
        reason,
    }
}

/// Account-level margin picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub balance: Quote,
    pub used_margin: Quote,
    pub unrealized_pnl: Quote,
    pub equity: Quote,
    pub free_margin: Quote,
    // equity / used margin in percent; zero with nothing open
    pub margin_level: Decimal,
}

/// Balance plus the open contracts' margin and mark-to-market.
/// Contracts without a usable price contribute margin but no unrealized pnl.
pub fn account_metrics<'a>(
    balance: Quote,
    contracts: impl IntoIterator<Item = &'a Contract>,
    mut price_of: impl FnMut(&str) -> Option<Price>,
) -> AccountMetrics {
    let mut used_margin = Quote::zero();
    let mut unrealized_pnl = Quote::zero();
    for contract in contracts.into_iter().filter(|c| c.is_open()) {
        used_margin = used_margin.add(contract.margin_used);
        if let Some(price) = price_of(&contract.symbol) {
            unrealized_pnl = unrealized_pnl.add(contract.pnl_at(price));
        }
    }

    let equity = balance.add(unrealized_pnl);
    let margin_level = if used_margin.is_positive() {
        equity.value() / used_margin.value() * dec!(100)
    } else {
        Decimal::ZERO
    };

    AccountMetrics {
        balance,
        used_margin,
        unrealized_pnl,
        equity,
        free_margin: equity.sub(used_margin),
        margin_level,
    }
}

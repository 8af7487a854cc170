//! Tick-driven liquidation of hedged legs opened through the engine.

mod common;

use brokerage_core::*;
use common::{px, Desk};
use rust_decimal_macros::dec;

fn open_pair(desk: &Desk, account: AccountId) -> PairedPosition {
    let order = desk.hedged(account, OrderSide::Buy, dec!(1), 10);
    let result = desk.engine.execute(order, px(dec!(100))).unwrap();
    desk.hedging.get_pair(result.pair_id.unwrap()).unwrap()
}

fn tick(desk: &Desk, price: rust_decimal::Decimal) -> Option<LiquidationReport> {
    let tick = desk.prices.update("BTCUSDT", px(price));
    desk.monitor.handle_tick(&tick).unwrap()
}

#[test]
fn long_liquidates_below_ninety_one() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let pair = open_pair(&desk, alice);

    let report = tick(&desk, dec!(91.1)).unwrap();
    assert_eq!(report.checked, 2);
    assert!(report.liquidated.is_empty());
    assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));

    let report = tick(&desk, dec!(90.9)).unwrap();
    assert_eq!(report.liquidated.len(), 1);
    assert!(report.is_clean());

    let done = &report.liquidated[0];
    assert_eq!(done.contract.id, pair.long.id);
    assert_eq!(done.contract.status, ContractStatus::Liquidated);
    assert_eq!(done.contract.close_price, Some(px(dec!(90.9))));
    assert_eq!(done.settlement.pnl.value(), dec!(-9.1));
    assert_eq!(done.settlement.credited.value(), dec!(0.9));
    assert_eq!(desk.balance(alice, "USDT"), dec!(980.80));

    // the short leg is untouched
    let short = desk.ledger.find_contract(pair.short.id).unwrap();
    assert_eq!(short, pair.short);
    assert_eq!(
        desk.hedging.get_pair(pair.pair_id).unwrap().state,
        PairState::PartiallyClosed
    );

    let records = desk.ledger.transactions();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_type, TransactionType::Liquidation);
    assert_eq!(records[0].contract_id, pair.long.id);
}

#[test]
fn short_liquidates_at_its_price_inclusive() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let pair = open_pair(&desk, alice);

    assert!(tick(&desk, dec!(108.99)).unwrap().liquidated.is_empty());

    let report = tick(&desk, dec!(109)).unwrap();
    assert_eq!(report.liquidated.len(), 1);
    assert_eq!(report.liquidated[0].contract.id, pair.short.id);
    // 10 - 9
    assert_eq!(report.total_credited().value(), dec!(1));
}

#[test]
fn gap_through_margin_credits_zero_and_takes_nothing() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    open_pair(&desk, alice);

    let report = tick(&desk, dec!(50)).unwrap();
    let done = &report.liquidated[0];
    assert_eq!(done.settlement.total_return.value(), dec!(-40));
    assert_eq!(done.settlement.credited, Quote::zero());
    assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));
    assert_eq!(done.transaction.details.total_return.value(), dec!(-40));
}

#[test]
fn closed_legs_are_not_candidates() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let pair = open_pair(&desk, alice);
    desk.hedging.close_leg(pair.long.id, px(dec!(95))).unwrap();

    let report = tick(&desk, dec!(80)).unwrap();
    assert_eq!(report.checked, 1);
    assert!(report.liquidated.is_empty());
    assert_eq!(
        desk.ledger.find_contract(pair.long.id).unwrap().status,
        ContractStatus::Closed
    );
}

#[test]
fn other_symbols_are_ignored() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USD", dec!(10000));
    let order = desk.order(alice, "XAUUSD", OrderSide::Buy, dec!(1), 10, ProductType::Cfd);
    desk.engine.execute(order, px(dec!(2000))).unwrap();

    let report = tick(&desk, dec!(1)).unwrap();
    assert_eq!(report.checked, 0);
    assert!(desk.ledger.all_contracts().iter().all(Contract::is_open));
}

#[test]
fn one_failure_does_not_block_the_batch() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let bob = desk.ledger.open_account("USDT", dec!(1000));
    let first = open_pair(&desk, alice);
    let second = open_pair(&desk, bob);
    desk.ledger.inject(Fault::ContractUpdate(first.long.id));

    let report = tick(&desk, dec!(90.5)).unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].contract_id, first.long.id);
    assert_eq!(report.liquidated.len(), 1);
    assert_eq!(report.liquidated[0].contract.id, second.long.id);
    assert!(desk.ledger.find_contract(first.long.id).unwrap().is_open());
    assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));
    assert_eq!(desk.balance(bob, "USDT"), dec!(980.40));
}

#[test]
fn stale_tick_after_fresh_one_is_dropped() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let pair = open_pair(&desk, alice);

    let crash = desk.prices.update("BTCUSDT", px(dec!(85)));
    let recovery = desk.prices.update("BTCUSDT", px(dec!(100)));

    assert!(desk.monitor.handle_tick(&recovery).unwrap().is_some());
    assert!(desk.monitor.handle_tick(&crash).unwrap().is_none());
    assert!(desk.ledger.find_contract(pair.long.id).unwrap().is_open());
}

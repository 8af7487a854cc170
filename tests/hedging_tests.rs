//! Hedged pair lifecycle: leg close, pair close, margin checks.

mod common;

use brokerage_core::*;
use common::{px, Desk};
use rust_decimal_macros::dec;

// alice holds 1000 USDT and one open BTCUSDT pair at 100, 10x
fn desk_with_pair() -> (Desk, AccountId, PairedPosition) {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let order = desk.hedged(alice, OrderSide::Buy, dec!(1), 10);
    let result = desk.engine.execute(order, px(dec!(100))).unwrap();
    let pair = desk.hedging.get_pair(result.pair_id.unwrap()).unwrap();
    (desk, alice, pair)
}

#[test]
fn closing_one_leg_leaves_sibling_untouched() {
    let (desk, alice, pair) = desk_with_pair();

    let closed = desk.hedging.close_leg(pair.long.id, px(dec!(105))).unwrap();

    assert_eq!(closed.settlement.pnl.value(), dec!(5));
    assert_eq!(closed.settlement.credited.value(), dec!(15));
    assert!(closed.sibling_still_open);
    assert_eq!(closed.contract.status, ContractStatus::Closed);
    assert_eq!(closed.contract.close_price, Some(px(dec!(105))));
    assert_eq!(desk.balance(alice, "USDT"), dec!(994.90));

    let sibling = desk.ledger.find_contract(pair.short.id).unwrap();
    assert_eq!(sibling, pair.short);

    let after = desk.hedging.get_pair(pair.pair_id).unwrap();
    assert_eq!(after.state, PairState::PartiallyClosed);
}

#[test]
fn leg_close_writes_audit_record() {
    let (desk, alice, pair) = desk_with_pair();

    let closed = desk.hedging.close_leg(pair.short.id, px(dec!(95))).unwrap();

    let records = desk.ledger.transactions();
    assert_eq!(records, vec![closed.transaction.clone()]);
    let record = &records[0];
    assert_eq!(record.transaction_number, "TX-000001");
    assert_eq!(record.tx_type, TransactionType::PositionClose);
    assert_eq!(record.account_id, alice);
    assert_eq!(record.pair_id, Some(pair.pair_id));
    assert_eq!(record.details.entry_price, px(dec!(100)));
    assert_eq!(record.details.close_price, px(dec!(95)));
    assert_eq!(record.details.total_return.value(), dec!(15));
    assert_eq!(record.credited.value(), dec!(15));
}

#[test]
fn closing_both_legs_separately_fully_closes_pair() {
    let (desk, alice, pair) = desk_with_pair();

    desk.hedging.close_leg(pair.long.id, px(dec!(105))).unwrap();
    let second = desk.hedging.close_leg(pair.short.id, px(dec!(105))).unwrap();

    assert!(!second.sibling_still_open);
    assert_eq!(second.settlement.credited.value(), dec!(5));
    assert_eq!(desk.balance(alice, "USDT"), dec!(999.90));
    assert_eq!(
        desk.hedging.get_pair(pair.pair_id).unwrap().state,
        PairState::FullyClosed
    );
}

#[test]
fn closed_leg_cannot_close_again() {
    let (desk, alice, pair) = desk_with_pair();
    desk.hedging.close_leg(pair.long.id, px(dec!(105))).unwrap();

    let err = desk.hedging.close_leg(pair.long.id, px(dec!(110))).unwrap_err();
    assert_eq!(
        err,
        HedgingError::NotOpen {
            contract_id: pair.long.id,
            status: ContractStatus::Closed,
        }
    );
    // credited exactly once
    assert_eq!(desk.balance(alice, "USDT"), dec!(994.90));
    assert_eq!(desk.ledger.transactions().len(), 1);
}

#[test]
fn losing_leg_credits_nothing_below_zero() {
    let (desk, alice, pair) = desk_with_pair();

    // short loses 15 on 10 of margin
    let closed = desk.hedging.close_leg(pair.short.id, px(dec!(115))).unwrap();

    assert_eq!(closed.settlement.total_return.value(), dec!(-5));
    assert_eq!(closed.settlement.credited, Quote::zero());
    assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));
}

#[test]
fn close_pair_settles_both_legs_at_one_price() {
    let (desk, alice, pair) = desk_with_pair();

    let outcome = desk.hedging.close_pair(pair.pair_id, px(dec!(120))).unwrap();

    assert_eq!(outcome.long.settlement.credited.value(), dec!(30));
    assert_eq!(outcome.short.settlement.credited, Quote::zero());
    assert_eq!(outcome.total_credited.value(), dec!(30));
    assert_eq!(desk.balance(alice, "USDT"), dec!(1009.90));

    let records = desk.ledger.transactions();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.tx_type == TransactionType::PairClose));
    assert_eq!(
        desk.hedging.get_pair(pair.pair_id).unwrap().state,
        PairState::FullyClosed
    );
}

#[test]
fn close_pair_refuses_broken_hedge() {
    let (desk, alice, pair) = desk_with_pair();
    desk.hedging.close_leg(pair.long.id, px(dec!(100))).unwrap();
    let balance = desk.balance(alice, "USDT");

    let err = desk.hedging.close_pair(pair.pair_id, px(dec!(100))).unwrap_err();
    assert_eq!(
        err,
        HedgingError::PairNotFullyOpen {
            pair_id: pair.pair_id,
            state: PairState::PartiallyClosed,
        }
    );
    assert_eq!(desk.balance(alice, "USDT"), balance);
    assert!(desk.ledger.find_contract(pair.short.id).unwrap().is_open());
}

#[test]
fn close_pair_is_all_or_nothing() {
    let (desk, alice, pair) = desk_with_pair();
    desk.ledger.inject(Fault::ContractUpdate(pair.short.id));

    let err = desk.hedging.close_pair(pair.pair_id, px(dec!(120))).unwrap_err();
    assert!(matches!(err, HedgingError::Ledger(LedgerError::Unavailable(_))));

    // the long leg's close and credit were rolled back with it
    assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));
    assert!(desk.ledger.find_contract(pair.long.id).unwrap().is_open());
    assert!(desk.ledger.transactions().is_empty());
}

#[test]
fn unknown_pair_is_invalid() {
    let desk = Desk::new();
    let missing = PairId::new();
    assert_eq!(
        desk.hedging.get_pair(missing).unwrap_err(),
        HedgingError::InvalidPair {
            pair_id: missing,
            legs: 0,
        }
    );
}

#[test]
fn surviving_leg_margin_check_uses_cached_price() {
    let (desk, _, pair) = desk_with_pair();
    desk.hedging.close_leg(pair.long.id, px(dec!(105))).unwrap();

    // no price cached: locked margin only
    let check = desk.hedging.validate_margin_after_closure(pair.short.id).unwrap();
    assert!(check.healthy);
    assert_eq!(check.effective_margin.value(), dec!(10));
    assert_eq!(check.required.value(), dec!(5));

    // short at 105: 10 - 5 meets the 5 requirement exactly
    desk.prices.update("BTCUSDT", px(dec!(105)));
    assert!(desk.hedging.validate_margin_after_closure(pair.short.id).unwrap().healthy);

    desk.prices.update("BTCUSDT", px(dec!(106)));
    let check = desk.hedging.validate_margin_after_closure(pair.short.id).unwrap();
    assert!(!check.healthy);
    assert!(check.reason.contains("below maintenance requirement"));
}

#[test]
fn margin_check_on_closed_contract_is_unhealthy() {
    let (desk, _, pair) = desk_with_pair();
    desk.hedging.close_leg(pair.long.id, px(dec!(105))).unwrap();

    let check = desk.hedging.validate_margin_after_closure(pair.long.id).unwrap();
    assert!(!check.healthy);
    assert_eq!(check.reason, "Contract is not open (current status: closed)");
}

#[test]
fn pairs_for_account_lists_every_pair() {
    let (desk, alice, first) = desk_with_pair();
    let order = desk.hedged(alice, OrderSide::Sell, dec!(2), 5);
    let second = desk.engine.execute(order, px(dec!(100))).unwrap().pair_id.unwrap();

    let mut ids: Vec<PairId> = desk
        .hedging
        .pairs_for_account(alice)
        .unwrap()
        .into_iter()
        .map(|p| p.pair_id)
        .collect();
    ids.sort_by_key(|id| id.to_string());
    let mut expected = vec![first.pair_id, second];
    expected.sort_by_key(|id| id.to_string());
    assert_eq!(ids, expected);

    let stranger = desk.ledger.open_account("USDT", dec!(0));
    assert!(desk.hedging.pairs_for_account(stranger).unwrap().is_empty());
}

#[test]
fn account_metrics_mark_open_legs() {
    let (desk, alice, _) = desk_with_pair();
    desk.prices.update("BTCUSDT", px(dec!(110)));

    let metrics = desk.hedging.account_metrics(alice).unwrap();

    assert_eq!(metrics.balance.value(), dec!(979.90));
    assert_eq!(metrics.used_margin.value(), dec!(20));
    // the legs offset each other
    assert_eq!(metrics.unrealized_pnl.value(), dec!(0));
    assert_eq!(metrics.equity.value(), dec!(979.90));
    assert_eq!(metrics.free_margin.value(), dec!(959.90));
    assert_eq!(metrics.margin_level, dec!(4899.5));
}

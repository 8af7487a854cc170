//! Many callers against one ledger: order claims, balance races, ticks racing closes.

mod common;

use brokerage_core::*;
use common::{px, Desk};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::thread;

#[test]
fn same_order_fills_exactly_once() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let order = desk.hedged(alice, OrderSide::Buy, dec!(1), 10);

    let outcomes: Vec<Result<ExecutionResult, EngineError>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| desk.engine.execute(order, px(dec!(100)))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let fills = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(r) if r.success))
        .count();
    assert_eq!(fills, 1);

    // losers either found the claim held or the order already filled
    for outcome in &outcomes {
        match outcome {
            Ok(r) if r.success => {}
            Ok(r) => assert!(matches!(r.rejection, Some(Rejection::NotPending { .. }))),
            Err(e) => assert_eq!(*e, EngineError::Ledger(LedgerError::AlreadyLocked(order))),
        }
    }

    assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));
    assert_eq!(desk.ledger.all_contracts().len(), 2);
}

#[test]
fn racing_debits_never_overdraw() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USDT", dec!(100));
    let orders: Vec<OrderId> = (0..16)
        .map(|_| desk.hedged(alice, OrderSide::Buy, dec!(1), 10))
        .collect();

    let results: Vec<ExecutionResult> = thread::scope(|s| {
        let handles: Vec<_> = orders
            .iter()
            .map(|&id| {
                let engine = &desk.engine;
                s.spawn(move || engine.execute(id, px(dec!(100))).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let filled = results.iter().filter(|r| r.success).count();
    // 100 / 20.10 per hedged open
    assert_eq!(filled, 4);
    for rejected in results.iter().filter(|r| !r.success) {
        assert!(matches!(
            rejected.rejection,
            Some(Rejection::InsufficientFunds { .. })
        ));
    }

    let balance = desk.balance(alice, "USDT");
    assert!(balance >= Decimal::ZERO);
    assert_eq!(balance, dec!(100) - dec!(20.10) * Decimal::from(filled));
    assert_eq!(desk.ledger.all_contracts().len(), filled * 2);
}

#[test]
fn price_writers_on_different_symbols_do_not_interfere() {
    let desk = Desk::new();
    let symbols = ["BTCUSDT", "ETHUSD", "XAUUSD", "EURUSD"];

    thread::scope(|s| {
        for (i, symbol) in symbols.iter().enumerate() {
            let prices = &desk.prices;
            s.spawn(move || {
                for step in 1..=500i64 {
                    prices.update(symbol, px(Decimal::from(step + i as i64 * 1000)));
                }
            });
        }
        // readers alongside the writers
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..500 {
                    for symbol in symbols {
                        if let Ok(p) = desk.prices.get(symbol) {
                            assert!(p.value() > Decimal::ZERO);
                        }
                    }
                }
            });
        }
    });

    for (i, symbol) in symbols.iter().enumerate() {
        assert_eq!(
            desk.prices.get(symbol).unwrap().value(),
            Decimal::from(500 + i as i64 * 1000)
        );
    }
    assert_eq!(desk.prices.snapshot().len(), 4);
}

#[test]
fn close_racing_liquidation_settles_once() {
    for _ in 0..20 {
        let desk = Desk::new();
        let alice = desk.ledger.open_account("USDT", dec!(1000));
        let order = desk.hedged(alice, OrderSide::Buy, dec!(1), 10);
        let result = desk.engine.execute(order, px(dec!(100))).unwrap();
        let long = result.contracts[0].id;

        thread::scope(|s| {
            s.spawn(|| {
                let tick = desk.prices.update("BTCUSDT", px(dec!(90)));
                desk.monitor.handle_tick(&tick).unwrap();
            });
            s.spawn(|| {
                // loses to the liquidation sometimes; that is fine
                let _ = desk.hedging.close_leg(long, px(dec!(90)));
            });
        });

        let records: Vec<_> = desk
            .ledger
            .transactions()
            .into_iter()
            .filter(|r| r.contract_id == long)
            .collect();
        assert_eq!(records.len(), 1);
        assert!(!desk.ledger.find_contract(long).unwrap().is_open());
        // both paths return margin + pnl = 0 at 90
        assert_eq!(desk.balance(alice, "USDT"), dec!(979.90));
    }
}

#[test]
fn ticks_for_many_symbols_run_in_parallel() {
    let desk = Desk::new();
    let alice = desk.ledger.open_account("USD", dec!(100000));
    let gold = desk.order(alice, "XAUUSD", OrderSide::Buy, dec!(1), 10, ProductType::Cfd);
    let eth = desk.order(alice, "ETHUSD", OrderSide::Buy, dec!(1), 10, ProductType::Futures);
    desk.engine.execute(gold, px(dec!(2000))).unwrap();
    desk.engine.execute(eth, px(dec!(3000))).unwrap();

    let reports: Vec<Option<LiquidationReport>> = thread::scope(|s| {
        let a = s.spawn(|| {
            let tick = desk.prices.update("XAUUSD", px(dec!(1800)));
            desk.monitor.handle_tick(&tick).unwrap()
        });
        let b = s.spawn(|| {
            let tick = desk.prices.update("ETHUSD", px(dec!(2700)));
            desk.monitor.handle_tick(&tick).unwrap()
        });
        vec![a.join().unwrap(), b.join().unwrap()]
    });

    for report in reports {
        let report = report.unwrap();
        assert_eq!(report.liquidated.len(), 1);
        assert_eq!(report.liquidated[0].contract.side, PositionSide::Long);
    }
}

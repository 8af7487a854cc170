//! Brokerage core simulation.
//!
//! Runs the execution scenarios end to end against the in-memory ledger:
//! hedged opens, insufficient funds, liquidation on a tick, leverage caps,
//! stale prices, A-book routing and pair closure.

use brokerage_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use std::sync::Arc;

type SimResult = Result<(), Box<dyn Error>>;

fn main() -> SimResult {
    telemetry::init_tracing("brokerage_core=info");

    println!("Brokerage Core Simulation");
    println!("In-memory ledger, manual clock\n");

    scenario_a_hedged_open()?;
    scenario_b_insufficient_funds()?;
    scenario_c_liquidation_on_tick()?;
    scenario_d_leverage_cap()?;
    scenario_e_stale_price()?;
    scenario_f_a_book_routing()?;
    scenario_g_pair_lifecycle()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Everything one scenario needs, wired the way a host process would.
struct Desk {
    ledger: Arc<MemoryLedger>,
    clock: Arc<ManualClock>,
    prices: Arc<PriceCache>,
    routing: Arc<InMemoryRoutingConfig>,
    engine: Engine,
    hedging: HedgingManager,
    monitor: LiquidationMonitor,
}

impl Desk {
    fn new(config: CoreConfig) -> Result<Self, ConfigError> {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_instrument(InstrumentMeta::crypto("BTCUSDT", "USDT"));
        ledger.add_instrument(InstrumentMeta::commodity("XAUUSD", "USD"));
        ledger.add_instrument(InstrumentMeta::forex(
            "EURUSD",
            "USD",
            Leverage::from_requested(10),
        ));

        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let prices = Arc::new(PriceCache::with_clock(&config.price_cache, clock.clone()));
        let routing = Arc::new(InMemoryRoutingConfig::new(config.routing.clone()));
        let providers = ProviderManager::new()
            .with_provider(Arc::new(MockProvider::new("mock_lp").with_slippage(Bps::new(5))))
            .with_provider(Arc::new(MockProvider::new("backup_lp")));

        let hedging = HedgingManager::new(ledger.clone(), prices.clone(), &config.risk)?;
        let monitor = LiquidationMonitor::new(ledger.clone(), prices.clone());
        let engine = Engine::new(
            config,
            ledger.clone(),
            prices.clone(),
            routing.clone(),
            providers,
        )?;

        Ok(Self {
            ledger,
            clock,
            prices,
            routing,
            engine,
            hedging,
            monitor,
        })
    }

    fn order(
        &self,
        account: AccountId,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        leverage: u32,
    ) -> OrderId {
        self.ledger.add_order(Order::market(
            account,
            symbol,
            side,
            amount,
            leverage,
            ProductType::Futures,
        ))
    }
}

fn px(v: Decimal) -> Result<Price, Box<dyn Error>> {
    Price::new(v).ok_or_else(|| format!("invalid price {v}").into())
}

/// Scenario A: buy 1.0 at 100, 10x, hedged product.
fn scenario_a_hedged_open() -> SimResult {
    println!("Scenario A: Hedged Open\n");

    let desk = Desk::new(CoreConfig::default())?;
    let alice = desk.ledger.open_account("USDT", dec!(1000));
    let order = desk.order(alice, "BTCUSDT", OrderSide::Buy, dec!(1), 10);

    let result = desk.engine.execute(order, px(dec!(100))?)?;
    println!("  {}", result.message);
    for leg in &result.contracts {
        println!(
            "  {} {} entry {} margin {} liq {:?}",
            leg.contract_number,
            leg.side,
            leg.entry_price,
            leg.margin_used,
            leg.liquidation_price.map(|p| p.value())
        );
    }
    println!("  Balance after open: {} USDT\n", desk.ledger.balance_of(alice, "USDT"));
    Ok(())
}

/// Scenario B: balance 5.00 against a 10.05 requirement (10x margin plus a 5 bps fee).
fn scenario_b_insufficient_funds() -> SimResult {
    println!("Scenario B: Insufficient Funds\n");

    let mut config = CoreConfig::default();
    config.fees.taker_fee_bps = Bps::new(5);
    let desk = Desk::new(config)?;
    let bob = desk.ledger.open_account("USD", dec!(5));
    let order = desk.ledger.add_order(Order::market(
        bob,
        "EURUSD",
        OrderSide::Buy,
        dec!(1),
        10,
        ProductType::Forex,
    ));

    let result = desk.engine.execute(order, px(dec!(100))?)?;
    println!("  success: {}", result.success);
    println!("  {}", result.message);
    println!("  Balance unchanged: {} USD\n", desk.ledger.balance_of(bob, "USD"));
    Ok(())
}

/// Scenario C: long at 100, 10x, liquidation price 91.
fn scenario_c_liquidation_on_tick() -> SimResult {
    println!("Scenario C: Liquidation On Tick\n");

    let desk = Desk::new(CoreConfig::default())?;
    let carol = desk.ledger.open_account("USDT", dec!(1000));
    let order = desk.order(carol, "BTCUSDT", OrderSide::Buy, dec!(1), 10);
    desk.engine.execute(order, px(dec!(100))?)?;

    for price in [dec!(91.1), dec!(90.9)] {
        let tick = desk.prices.update("BTCUSDT", px(price)?);
        if let Some(report) = desk.monitor.handle_tick(&tick)? {
            println!(
                "  tick {}: checked {}, liquidated {}, credited {}",
                price,
                report.checked,
                report.liquidated.len(),
                report.total_credited()
            );
        }
    }
    println!("  Balance after liquidation: {} USDT\n", desk.ledger.balance_of(carol, "USDT"));
    Ok(())
}

/// Scenario D: 20x requested on a 10x forex pair.
fn scenario_d_leverage_cap() -> SimResult {
    println!("Scenario D: Leverage Cap\n");

    let desk = Desk::new(CoreConfig::default())?;
    let dave = desk.ledger.open_account("USD", dec!(10000));
    let order = desk.ledger.add_order(Order::market(
        dave,
        "EURUSD",
        OrderSide::Sell,
        dec!(1000),
        20,
        ProductType::Forex,
    ));

    let result = desk.engine.execute(order, px(dec!(1.085))?)?;
    println!("  {}", result.message);
    if let Some(stored) = desk.ledger.order(order) {
        println!("  Order status: {}\n", stored.status);
    }
    Ok(())
}

/// Scenario E: a cached price read 61 seconds later.
fn scenario_e_stale_price() -> SimResult {
    println!("Scenario E: Stale Price\n");

    let desk = Desk::new(CoreConfig::default())?;
    desk.prices.update("EURUSD", px(dec!(1.0850))?);
    desk.clock.advance_secs(60);
    println!("  at T+60s: {:?}", desk.prices.get("EURUSD").map(|p| p.value()));
    desk.clock.advance_secs(1);
    match desk.prices.get("EURUSD") {
        Ok(price) => println!("  at T+61s: {price}"),
        Err(e) => println!("  at T+61s: {e}"),
    }

    let erin = desk.ledger.open_account("USD", dec!(10000));
    let order = desk.ledger.add_order(Order::market(
        erin,
        "EURUSD",
        OrderSide::Buy,
        dec!(1000),
        5,
        ProductType::Forex,
    ));
    let result = desk.engine.execute_at_market(order)?;
    println!("  execute at market: {}\n", result.message);
    Ok(())
}

/// A large order on a routed book goes to the LP and is mirrored internally.
fn scenario_f_a_book_routing() -> SimResult {
    println!("Scenario F: A-Book Routing\n");

    let desk = Desk::new(CoreConfig::staging())?;
    let frank = desk.ledger.open_account("USDT", dec!(100000));

    let small = desk.order(frank, "BTCUSDT", OrderSide::Buy, dec!(0.1), 10);
    let result = desk.engine.execute(small, px(dec!(50000))?)?;
    println!("  small: {} ({:?})", result.message, result.strategy.map(|s| s.to_string()));

    let large = desk.order(frank, "BTCUSDT", OrderSide::Buy, dec!(1), 10);
    let result = desk.engine.execute(large, px(dec!(50000))?)?;
    println!("  large: {}", result.message);
    if let Some(decision) = &result.routing {
        println!("  reason: {}", decision.reason);
    }

    // primary goes down, the fallback fills
    desk.routing
        .apply(RoutingUpdate::FallbackLp(Some("backup_lp".to_string())))?;
    desk.routing
        .apply(RoutingUpdate::PrimaryLp("offline_lp".to_string()))?;
    let retry = desk.order(frank, "BTCUSDT", OrderSide::Sell, dec!(1), 10);
    let result = desk.engine.execute(retry, px(dec!(50000))?)?;
    println!("  failover: {}", result.message);
    println!("  LP routes recorded: {}\n", desk.ledger.lp_routes().len());
    Ok(())
}

/// Close one leg, check the survivor, then close a fresh pair atomically.
fn scenario_g_pair_lifecycle() -> SimResult {
    println!("Scenario G: Pair Lifecycle\n");

    let desk = Desk::new(CoreConfig::default())?;
    let grace = desk.ledger.open_account("USD", dec!(5000));

    let first = desk.order(grace, "XAUUSD", OrderSide::Buy, dec!(1), 20);
    let opened = desk.engine.execute(first, px(dec!(2000))?)?;
    let pair_id = opened.pair_id.ok_or("hedged open returned no pair")?;

    let pair = desk.hedging.get_pair(pair_id)?;
    let closed = desk.hedging.close_leg(pair.long.id, px(dec!(2050))?)?;
    println!(
        "  closed {} pnl {} credited {} (sibling open: {})",
        closed.contract.contract_number,
        closed.settlement.pnl,
        closed.settlement.credited,
        closed.sibling_still_open
    );

    desk.prices.update("XAUUSD", px(dec!(2050))?);
    let check = desk.hedging.validate_margin_after_closure(pair.short.id)?;
    println!("  survivor healthy: {} ({})", check.healthy, check.reason);
    println!("  pair state: {}", desk.hedging.get_pair(pair_id)?.state);
    let metrics = desk.hedging.account_metrics(grace)?;
    println!(
        "  equity {} used margin {} margin level {}%",
        metrics.equity,
        metrics.used_margin,
        metrics.margin_level.round_dp(2)
    );

    let second = desk.order(grace, "XAUUSD", OrderSide::Sell, dec!(1), 20);
    let opened = desk.engine.execute(second, px(dec!(2050))?)?;
    let pair_id = opened.pair_id.ok_or("hedged open returned no pair")?;
    let both = desk.hedging.close_pair(pair_id, px(dec!(2040))?)?;
    println!("  pair closed, total credited {}", both.total_credited);
    println!("  Balance: {} USD", desk.ledger.balance_of(grace, "USD"));
    println!("  Audit records: {}", desk.ledger.transactions().len());
    Ok(())
}

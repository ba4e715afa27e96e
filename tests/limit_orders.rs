//! Price-time priority and time-in-force scenarios for resting limit orders.

use rust_decimal_macros::dec;
use trading_core::prelude::*;

fn limit(symbol: &str, side: Side, price: rust_decimal::Decimal, qty: rust_decimal::Decimal, tif: TimeInForce, user: &str) -> Order {
    Order {
        id: OrderId::new(),
        symbol: symbol.into(),
        side,
        kind: OrderKind::Limit,
        time_in_force: tif,
        price: Some(Price::new(price)),
        stop_price: None,
        quantity: Quantity::new(qty),
        filled: Quantity::zero(),
        iceberg: None,
        user_id: user.into(),
        client_order_id: "t".into(),
        created_at: 0,
        status: OrderStatus::New,
    }
}

fn engine_with_symbol(symbol: &str) -> MatchingEngine {
    let engine = MatchingEngine::new();
    engine.register_symbol(symbol, SymbolConfig::default());
    engine
}

#[test]
fn resting_orders_at_the_same_price_fill_in_arrival_order() {
    let engine = engine_with_symbol("BTC-USD");
    let first = engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(1), TimeInForce::Gtc, "m1"))
        .unwrap()
        .order;
    let second = engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(1), TimeInForce::Gtc, "m2"))
        .unwrap()
        .order;

    let outcome = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(1), TimeInForce::Gtc, "taker"))
        .unwrap();

    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].maker_order_id, first.id);
    assert_ne!(outcome.trades[0].maker_order_id, second.id);
}

#[test]
fn fill_or_kill_rejects_when_liquidity_is_insufficient() {
    let engine = engine_with_symbol("BTC-USD");
    engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(1), TimeInForce::Gtc, "maker"))
        .unwrap();

    let outcome = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(5), TimeInForce::Fok, "taker"))
        .unwrap();

    assert!(outcome.trades.is_empty());
    assert_eq!(outcome.order.status, OrderStatus::Canceled);
    // the untouched resting order must still be there
    let snapshot = engine.snapshot("BTC-USD", 10).unwrap();
    assert_eq!(snapshot.asks.len(), 1);
}

#[test]
fn fill_or_kill_fills_completely_when_liquidity_suffices() {
    let engine = engine_with_symbol("BTC-USD");
    engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(5), TimeInForce::Gtc, "maker"))
        .unwrap();

    let outcome = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(5), TimeInForce::Fok, "taker"))
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Filled);
    assert_eq!(outcome.trades[0].quantity.as_decimal(), dec!(5));
}

#[test]
fn immediate_or_cancel_fills_available_quantity_and_cancels_the_remainder() {
    let engine = engine_with_symbol("BTC-USD");
    engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(2), TimeInForce::Gtc, "maker"))
        .unwrap();

    let outcome = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(5), TimeInForce::Ioc, "taker"))
        .unwrap();

    assert_eq!(outcome.order.filled.as_decimal(), dec!(2));
    assert_eq!(outcome.order.status, OrderStatus::Canceled);
}

#[test]
fn iceberg_order_only_exposes_its_display_quantity_in_the_snapshot() {
    let engine = engine_with_symbol("BTC-USD");
    let mut iceberg = limit("BTC-USD", Side::Sell, dec!(100), dec!(10), TimeInForce::Gtc, "maker");
    iceberg.kind = OrderKind::Iceberg;
    iceberg.iceberg = Some(IcebergState::new(Quantity::new(dec!(10)), Quantity::new(dec!(2))));
    engine.submit(iceberg).unwrap();

    let snapshot = engine.snapshot("BTC-USD", 10).unwrap();
    assert_eq!(snapshot.asks[0].quantity.as_decimal(), dec!(2));
}

#[test]
fn iceberg_refills_its_display_slice_after_each_fill() {
    let engine = engine_with_symbol("BTC-USD");
    let mut iceberg = limit("BTC-USD", Side::Sell, dec!(100), dec!(10), TimeInForce::Gtc, "maker");
    iceberg.kind = OrderKind::Iceberg;
    iceberg.iceberg = Some(IcebergState::new(Quantity::new(dec!(10)), Quantity::new(dec!(2))));
    engine.submit(iceberg).unwrap();

    engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(2), TimeInForce::Gtc, "taker1"))
        .unwrap();

    let snapshot = engine.snapshot("BTC-USD", 10).unwrap();
    assert_eq!(snapshot.asks[0].quantity.as_decimal(), dec!(2));
}

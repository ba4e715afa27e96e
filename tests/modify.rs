//! `modify` priority-retention rules (resolved Open Question (b) in
//! DESIGN.md): a quantity-only decrease keeps queue position; any price
//! change or quantity increase is cancel-then-resubmit.

use rust_decimal_macros::dec;
use trading_core::prelude::*;

fn limit(symbol: &str, side: Side, price: rust_decimal::Decimal, qty: rust_decimal::Decimal, user: &str) -> Order {
    Order {
        id: OrderId::new(),
        symbol: symbol.into(),
        side,
        kind: OrderKind::Limit,
        time_in_force: TimeInForce::Gtc,
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
fn decreasing_quantity_in_place_keeps_queue_position() {
    let engine = engine_with_symbol("BTC-USD");
    let first = engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(5), "first"))
        .unwrap()
        .order;
    engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(5), "second"))
        .unwrap();

    let outcome = engine.modify("BTC-USD", first.id, None, Some(Quantity::new(dec!(2)))).unwrap();
    match outcome {
        ModifyOutcome::Modified { order_id, order } => {
            assert_eq!(order_id, first.id);
            assert_eq!(order.quantity.as_decimal(), dec!(2));
        }
        other => panic!("expected Modified, got {other:?}"),
    }

    // priority retained: first (now 2) still trades ahead of second.
    let trade_outcome = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(2), "taker"))
        .unwrap();
    assert_eq!(trade_outcome.trades[0].maker_order_id, first.id);
}

#[test]
fn changing_price_is_treated_as_cancel_and_resubmit() {
    let engine = engine_with_symbol("BTC-USD");
    let first = engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(5), "first"))
        .unwrap()
        .order;

    let outcome = engine.modify("BTC-USD", first.id, Some(Price::new(dec!(101))), None).unwrap();
    match outcome {
        ModifyOutcome::Replaced { old_order_id, .. } => assert_eq!(old_order_id, first.id),
        other => panic!("expected Replaced, got {other:?}"),
    }

    let snapshot = engine.snapshot("BTC-USD", 10).unwrap();
    assert_eq!(snapshot.asks[0].price.as_decimal(), dec!(101));
}

#[test]
fn increasing_quantity_is_treated_as_cancel_and_resubmit() {
    let engine = engine_with_symbol("BTC-USD");
    let first = engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(5), "first"))
        .unwrap()
        .order;
    engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(5), "second"))
        .unwrap();

    let outcome = engine.modify("BTC-USD", first.id, None, Some(Quantity::new(dec!(10)))).unwrap();
    assert!(matches!(outcome, ModifyOutcome::Replaced { .. }));
}

#[test]
fn modifying_an_unknown_order_is_reported_as_not_found() {
    let engine = engine_with_symbol("BTC-USD");
    let outcome = engine
        .modify("BTC-USD", OrderId::new(), None, Some(Quantity::new(dec!(1))))
        .unwrap();
    assert!(matches!(outcome, ModifyOutcome::NotFound));
}

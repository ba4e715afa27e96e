//! End-to-end wiring across the matching engine, market-data distributor,
//! and lazy component supervisor.

use rust_decimal_macros::dec;
use std::sync::Arc;
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

#[tokio::test]
async fn engine_trades_flow_through_the_distributor_to_subscribers_with_sequence_numbers() {
    let engine = MatchingEngine::new();
    engine.register_symbol("BTC-USD", SymbolConfig::default());

    let distributor = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
    distributor.register_symbol("BTC-USD");
    let mut trade_sub = distributor.subscribe("BTC-USD", DataType::Trade, None).unwrap();

    engine
        .submit(limit("BTC-USD", Side::Sell, dec!(100), dec!(1), "maker"))
        .unwrap();
    let outcome = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(100), dec!(1), "taker"))
        .unwrap();

    for trade in &outcome.trades {
        distributor.ingest_trade(trade, &[]);
    }

    let envelope = trade_sub.recv().await.unwrap();
    assert_eq!(envelope.sequence, 1);
    assert_eq!(envelope.symbol, "BTC-USD");
    assert!(matches!(envelope.payload, EventPayload::Trade(_)));
}

struct RejectOver100;
impl RiskGate for RejectOver100 {
    fn check(&self, order: &Order) -> RiskVerdict {
        match order.price {
            Some(price) if price.as_decimal() > dec!(100) => RiskVerdict::Block("price ceiling exceeded".into()),
            _ => RiskVerdict::Allow,
        }
    }
}

#[test]
fn a_delegated_risk_gate_blocks_admission_before_the_book_is_touched() {
    let engine = MatchingEngine::with_risk_gate(Arc::new(RejectOver100));
    engine.register_symbol("BTC-USD", SymbolConfig::default());

    let err = engine
        .submit(limit("BTC-USD", Side::Buy, dec!(150), dec!(1), "u1"))
        .unwrap_err();
    assert!(matches!(err, EngineError::RiskBlocked(_)));
    assert!(engine.snapshot("BTC-USD", 10).unwrap().bids.is_empty());

    engine
        .submit(limit("BTC-USD", Side::Buy, dec!(50), dec!(1), "u1"))
        .unwrap();
    assert_eq!(engine.snapshot("BTC-USD", 10).unwrap().bids.len(), 1);
}

#[tokio::test]
async fn the_matching_engine_can_be_lazily_supervised_and_warmed_up() {
    let supervisor = Arc::new(Supervisor::new(SupervisorConfig::local(), Metrics::new()));
    supervisor
        .register(ComponentSpec {
            name: "matching-engine".to_string(),
            priority: 0,
            memory_estimate: 0,
            timeout: std::time::Duration::from_secs(5),
            provider: Arc::new(|_scope| {
                Box::pin(async move {
                    let engine = MatchingEngine::new();
                    engine.register_symbol("BTC-USD", SymbolConfig::default());
                    Ok(Arc::new(engine) as Instance)
                })
            }),
            cleanup: None,
        })
        .unwrap();

    supervisor.warm_up().await;

    let handle = supervisor.get::<MatchingEngine>("matching-engine").await.unwrap();
    assert!(handle.has_symbol("BTC-USD"));
}

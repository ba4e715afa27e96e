//! Abstract risk/compliance boundary.
//!
//! `spec.md` §1 excludes the risk-rule-engine's business-rule contents
//! from this design, but the matching engine must still host a delegation
//! point for it (the supervisor owns the concrete implementation as a
//! lazy component; see `supervisor`).

use crate::engine::order::Order;

/// Outcome of a risk/compliance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskVerdict {
    /// The order may proceed to matching.
    Allow,
    /// The order is rejected with the given human-readable reason.
    Block(String),
}

/// A delegated risk/compliance check, run synchronously at ingress before
/// an order reaches the book.
///
/// Implementations are domain-specific and out of scope for this crate;
/// a permissive no-op implementation is provided for tests and for
/// callers that host risk checks elsewhere in the pipeline.
pub trait RiskGate: Send + Sync {
    /// Evaluate `order` and return whether it may proceed.
    fn check(&self, order: &Order) -> RiskVerdict;
}

/// A `RiskGate` that allows every order. Useful as a default and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl RiskGate for AllowAll {
    fn check(&self, _order: &Order) -> RiskVerdict {
        RiskVerdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{OrderId, Price, Quantity};
    use crate::engine::order::{OrderKind, OrderStatus, Side, TimeInForce};
    use rust_decimal_macros::dec;

    #[test]
    fn allow_all_always_allows() {
        let order = Order {
            id: OrderId::new(),
            symbol: "BTC-USD".into(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            time_in_force: TimeInForce::Gtc,
            price: Some(Price::new(dec!(100))),
            stop_price: None,
            quantity: Quantity::new(dec!(1)),
            filled: Quantity::zero(),
            iceberg: None,
            user_id: "u1".into(),
            client_order_id: "c1".into(),
            created_at: 0,
            status: OrderStatus::New,
        };
        assert_eq!(AllowAll.check(&order), RiskVerdict::Allow);
    }
}

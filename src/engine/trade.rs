//! Trade events, `spec.md` §3 "Trade".

use crate::common::{OrderId, Price, Quantity, TradeId};
use crate::engine::order::Side;
use serde::{Deserialize, Serialize};

/// An immutable trade produced by the matching engine.
///
/// Trades are created exactly once by a symbol's single matching writer
/// and never mutated afterward. `sequence` is strictly increasing and
/// gap-free per symbol; `timestamp` is non-decreasing per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Opaque unique trade id.
    pub id: TradeId,
    /// Trading symbol.
    pub symbol: String,
    /// Execution price (maker price rule: the resting order's price).
    pub price: Price,
    /// Executed quantity.
    pub quantity: Quantity,
    /// Side of the incoming (taker) order.
    pub taker_side: Side,
    /// The resting order that provided liquidity.
    pub maker_order_id: OrderId,
    /// The incoming order that consumed liquidity.
    pub taker_order_id: OrderId,
    /// Commit timestamp, milliseconds since epoch, monotonically
    /// non-decreasing within a symbol.
    pub timestamp: u64,
    /// Strictly increasing, gap-free sequence number within the symbol.
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trade_is_cloneable_and_immutable_by_construction() {
        let trade = Trade {
            id: TradeId::new(),
            symbol: "BTC-USD".into(),
            price: Price::new(dec!(100)),
            quantity: Quantity::new(dec!(1)),
            taker_side: Side::Buy,
            maker_order_id: OrderId::new(),
            taker_order_id: OrderId::new(),
            timestamp: 1,
            sequence: 1,
        };
        let copy = trade.clone();
        assert_eq!(trade, copy);
    }
}

//! Rolling 24h ticker state, derived from the trade stream when no
//! external ticker feed exists (`spec.md` §3 "TickerState", §4.2 "Ticker/
//! OHLCV derivation").

use crate::common::{Price, Quantity};
use crate::engine::trade::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const WINDOW_MILLIS: u64 = 24 * 60 * 60 * 1000;

/// One trade's contribution to the rolling window, retained until it ages
/// out.
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    timestamp: u64,
    price: Decimal,
    quantity: Decimal,
}

/// Per-symbol rolling 24h ticker, `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerState {
    /// Trading symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_price: Price,
    /// 24h opening price (price of the oldest trade still in the window).
    pub open: Price,
    /// 24h high.
    pub high: Price,
    /// 24h low.
    pub low: Price,
    /// 24h close (alias of `last_price`, kept for wire-shape parity with
    /// `spec.md`'s OHLCV naming).
    pub close: Price,
    /// 24h cumulative traded volume.
    pub volume: Quantity,
    /// 24h volume-weighted average price.
    pub vwap: Price,
    /// Timestamp of the last update.
    pub updated_at: u64,
}

/// Mutable rolling-window tracker that produces [`TickerState`] snapshots.
///
/// Not `Send`/`Sync` by itself; the distributor wraps one per symbol in
/// its own lock (see `distributor::mod::MarketDataDistributor`).
#[derive(Debug, Default)]
pub struct TickerTracker {
    window: VecDeque<WindowEntry>,
}

impl TickerTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: VecDeque::new(),
        }
    }

    /// Fold a new trade into the rolling window and return the updated
    /// ticker state for `symbol`.
    pub fn update(&mut self, symbol: &str, trade: &Trade) -> TickerState {
        self.window.push_back(WindowEntry {
            timestamp: trade.timestamp,
            price: trade.price.as_decimal(),
            quantity: trade.quantity.as_decimal(),
        });
        self.evict_expired(trade.timestamp);
        self.snapshot(symbol, trade.timestamp)
    }

    fn evict_expired(&mut self, now: u64) {
        while let Some(front) = self.window.front() {
            if now.saturating_sub(front.timestamp) > WINDOW_MILLIS {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn snapshot(&self, symbol: &str, updated_at: u64) -> TickerState {
        let mut high = Decimal::MIN;
        let mut low = Decimal::MAX;
        let mut volume = Decimal::ZERO;
        let mut notional = Decimal::ZERO;
        for entry in &self.window {
            high = high.max(entry.price);
            low = low.min(entry.price);
            volume += entry.quantity;
            notional += entry.price * entry.quantity;
        }
        let last = self.window.back().map(|e| e.price).unwrap_or(Decimal::ZERO);
        let open = self.window.front().map(|e| e.price).unwrap_or(last);
        let vwap = if volume.is_zero() {
            last
        } else {
            notional / volume
        };

        TickerState {
            symbol: symbol.to_string(),
            last_price: Price::new(last),
            open: Price::new(open),
            high: Price::new(if high == Decimal::MIN { last } else { high }),
            low: Price::new(if low == Decimal::MAX { last } else { low }),
            close: Price::new(last),
            volume: Quantity::new(volume),
            vwap: Price::new(vwap),
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{OrderId, TradeId};
    use crate::engine::order::Side;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, qty: Decimal, ts: u64) -> Trade {
        Trade {
            id: TradeId::new(),
            symbol: "BTC-USD".into(),
            price: Price::new(price),
            quantity: Quantity::new(qty),
            taker_side: Side::Buy,
            maker_order_id: OrderId::new(),
            taker_order_id: OrderId::new(),
            timestamp: ts,
            sequence: 1,
        }
    }

    #[test]
    fn vwap_is_notional_weighted() {
        let mut tracker = TickerTracker::new();
        tracker.update("BTC-USD", &trade(dec!(100), dec!(1), 1_000));
        let state = tracker.update("BTC-USD", &trade(dec!(200), dec!(1), 2_000));
        assert_eq!(state.vwap.as_decimal(), dec!(150));
        assert_eq!(state.high.as_decimal(), dec!(200));
        assert_eq!(state.low.as_decimal(), dec!(100));
    }

    #[test]
    fn trades_older_than_24h_age_out_of_the_window() {
        let mut tracker = TickerTracker::new();
        tracker.update("BTC-USD", &trade(dec!(100), dec!(1), 0));
        let state = tracker.update("BTC-USD", &trade(dec!(200), dec!(1), WINDOW_MILLIS + 1_000));
        // The first trade has aged out: open/low should reflect only the second.
        assert_eq!(state.open.as_decimal(), dec!(200));
        assert_eq!(state.low.as_decimal(), dec!(200));
    }
}

//! Multi-symbol matching engine: symbol registry, trade fan-out, and the
//! delegated risk gate (`spec.md` §4.1, §1 "conceptually a single writer
//! per symbol").

use crate::common::OrderId;
use crate::engine::book::{BookSnapshot, CancelOutcome, ModifyOutcome, OrderBook, SubmitOutcome};
use crate::engine::error::EngineError;
use crate::engine::order::Order;
use crate::engine::risk::{AllowAll, RiskGate, RiskVerdict};
use crate::engine::stp::SelfCrossPolicy;
use crate::engine::trade::Trade;
use crate::engine::algorithm::Algorithm;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Per-symbol configuration used when a book is first registered.
#[derive(Debug, Clone)]
pub struct SymbolConfig {
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Matching algorithm for this symbol's book.
    pub algorithm: Algorithm,
    /// Self-trade prevention policy.
    pub self_cross_policy: SelfCrossPolicy,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            tick_size: Decimal::new(1, 2), // 0.01
            algorithm: Algorithm::PriceTime,
            self_cross_policy: SelfCrossPolicy::Allow,
        }
    }
}

/// Default capacity of each symbol's trade broadcast channel. Lagging
/// subscribers receive a `RecvError::Lagged` rather than blocking the
/// matching writer — matching throughput must never depend on a slow
/// consumer (`spec.md` §5 "never block the hot path").
const TRADE_CHANNEL_CAPACITY: usize = 4096;

struct SymbolState {
    book: OrderBook,
    trades_tx: broadcast::Sender<Trade>,
}

/// Owns one [`OrderBook`] per registered symbol plus the delegated risk
/// gate, and fans committed trades out to subscribers.
///
/// `spec.md` §1 states the engine is "conceptually a single writer per
/// symbol"; this type does not itself enforce single-writer access (the
/// caller's ingress pipeline is expected to serialize per-symbol
/// mutation, e.g. by routing each symbol's orders through one task), but
/// every public method here is safe to call concurrently across symbols.
pub struct MatchingEngine {
    symbols: DashMap<String, Arc<SymbolState>>,
    risk_gate: Arc<dyn RiskGate>,
}

impl MatchingEngine {
    /// Create an engine with a permissive (`AllowAll`) risk gate.
    #[must_use]
    pub fn new() -> Self {
        Self::with_risk_gate(Arc::new(AllowAll))
    }

    /// Create an engine delegating ingress risk checks to `risk_gate`.
    #[must_use]
    pub fn with_risk_gate(risk_gate: Arc<dyn RiskGate>) -> Self {
        Self {
            symbols: DashMap::new(),
            risk_gate,
        }
    }

    /// Register a new symbol with the given configuration. A symbol may
    /// only be registered once; re-registering is a no-op if already
    /// present.
    pub fn register_symbol(&self, symbol: impl Into<String>, config: SymbolConfig) {
        let symbol = symbol.into();
        if self.symbols.contains_key(&symbol) {
            return;
        }
        info!(symbol = %symbol, "registering symbol");
        let (trades_tx, _) = broadcast::channel(TRADE_CHANNEL_CAPACITY);
        let book = OrderBook::new(symbol.clone(), config.tick_size, config.algorithm, config.self_cross_policy);
        self.symbols
            .insert(symbol, Arc::new(SymbolState { book, trades_tx }));
    }

    /// Returns `true` if `symbol` has a registered book.
    #[must_use]
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    fn state(&self, symbol: &str) -> Result<Arc<SymbolState>, EngineError> {
        self.symbols
            .get(symbol)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))
    }

    /// Submit a new order, running it through the delegated risk gate
    /// before admission.
    pub fn submit(&self, order: Order) -> Result<SubmitOutcome, EngineError> {
        let state = self.state(&order.symbol)?;
        if let RiskVerdict::Block(reason) = self.risk_gate.check(&order) {
            return Err(EngineError::RiskBlocked(reason));
        }
        let outcome = state.book.submit(order)?;
        for trade in &outcome.trades {
            // A broadcast channel with no receivers returns `Err`; that's
            // expected and not a failure of the matching path.
            let _ = state.trades_tx.send(trade.clone());
        }
        debug!(
            order_id = %outcome.order.id,
            trades = outcome.trades.len(),
            status = ?outcome.order.status,
            "order submitted"
        );
        Ok(outcome)
    }

    /// Cancel a resting order on `symbol`.
    pub fn cancel(&self, symbol: &str, order_id: OrderId) -> Result<CancelOutcome, EngineError> {
        Ok(self.state(symbol)?.book.cancel(order_id))
    }

    /// Modify a resting order on `symbol`.
    pub fn modify(
        &self,
        symbol: &str,
        order_id: OrderId,
        new_price: Option<crate::common::Price>,
        new_quantity: Option<crate::common::Quantity>,
    ) -> Result<ModifyOutcome, EngineError> {
        let state = self.state(symbol)?;
        let outcome = state.book.modify(order_id, new_price, new_quantity)?;
        if let ModifyOutcome::Replaced { trades, .. } = &outcome {
            for trade in trades {
                let _ = state.trades_tx.send(trade.clone());
            }
        }
        Ok(outcome)
    }

    /// Top-of-book depth snapshot for `symbol`.
    pub fn snapshot(&self, symbol: &str, depth: usize) -> Result<BookSnapshot, EngineError> {
        Ok(self.state(symbol)?.book.snapshot(depth))
    }

    /// Mass-cancel every resting order owned by `user_id` on `symbol`.
    pub fn mass_cancel(&self, symbol: &str, user_id: &str) -> Result<Vec<Order>, EngineError> {
        Ok(self.state(symbol)?.book.mass_cancel(user_id))
    }

    /// Subscribe to the live trade stream for `symbol`. Each subscriber
    /// gets its own lagging-tolerant receiver; a slow consumer drops
    /// trades rather than backpressuring the matching writer.
    pub fn subscribe_trades(&self, symbol: &str) -> Result<broadcast::Receiver<Trade>, EngineError> {
        Ok(self.state(symbol)?.trades_tx.subscribe())
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

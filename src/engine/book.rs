//! Per-symbol order book: the core of the matching engine (`spec.md` §4.1).

use crate::common::ids::SequenceCounter;
use crate::common::{OrderId, Price, Quantity, TradeId};
use crate::engine::algorithm::{allocate_pro_rata, clearing_price, Algorithm, ProRataCandidate};
use crate::engine::error::EngineError;
use crate::engine::order::{IcebergState, Order, OrderKind, OrderStatus, Side, TimeInForce};
use crate::engine::price_level::{PriceLevel, RefillAction};
use crate::engine::stp::{STPMode, SelfCrossPolicy};
use crate::engine::trade::Trade;
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

/// A single aggregated depth level for a book snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelAgg {
    /// The level's price.
    pub price: Price,
    /// Aggregate visible quantity resting at this level.
    pub quantity: Quantity,
}

/// A point-in-time view of the top of book, `spec.md` §4.1 "Snapshot".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Trading symbol.
    pub symbol: String,
    /// Bid levels, best (highest price) first.
    pub bids: Vec<LevelAgg>,
    /// Ask levels, best (lowest price) first.
    pub asks: Vec<LevelAgg>,
    /// Monotonically increasing snapshot sequence number.
    pub sequence: u64,
}

/// Outcome of a successful `submit` call.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The order's state after ingress processing (admitted, possibly
    /// with `filled`/`status` updated by an immediate sweep).
    pub order: Order,
    /// Trades generated by this submission, in commit order.
    pub trades: Vec<Trade>,
}

/// Outcome of a `cancel` call, `spec.md` §4.1 "Cancel".
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The order was resting and has been canceled.
    Canceled(Order),
    /// The order was already in a terminal state; no-op, current state
    /// returned.
    AlreadyTerminal(OrderStatus),
    /// No order with that id is known to this book.
    NotFound,
}

/// Outcome of a `modify` call, `spec.md` §4.1 "Modify".
#[derive(Debug, Clone)]
pub enum ModifyOutcome {
    /// Priority was retained: the order was updated in place, keeping its
    /// original id and queue position.
    Modified {
        /// The order's id (unchanged).
        order_id: OrderId,
        /// The order after modification.
        order: Order,
    },
    /// Priority was lost: the original order was canceled and a new order
    /// was submitted in its place (new id, tail of the queue), possibly
    /// trading immediately against the book.
    Replaced {
        /// The original order's id.
        old_order_id: OrderId,
        /// The new order's id.
        new_order_id: OrderId,
        /// The new order's state after admission.
        order: Order,
        /// Any trades generated by the resubmission.
        trades: Vec<Trade>,
    },
    /// The order was already in a terminal state.
    AlreadyTerminal(OrderStatus),
    /// No order with that id is known to this book.
    NotFound,
}

/// Per-symbol order book. Owns exclusive mutable access to its resting
/// orders; the matching engine (`engine::manager`) serializes all ingress
/// for a symbol through a single logical writer, so internal locking here
/// only needs to protect against the book's own concurrent readers
/// (snapshot/cancel racing with submit), not against concurrent writers.
pub struct OrderBook {
    symbol: String,
    tick_size: Decimal,
    bids: SkipMap<u128, Arc<PriceLevel>>,
    asks: SkipMap<u128, Arc<PriceLevel>>,
    order_locations: DashMap<OrderId, (u128, Side)>,
    user_orders: DashMap<String, Vec<OrderId>>,
    terminal_orders: DashMap<OrderId, OrderStatus>,
    pending_stops: Mutex<Vec<Order>>,
    trade_sequence: SequenceCounter,
    snapshot_sequence: SequenceCounter,
    last_trade_price: Mutex<Option<Price>>,
    algorithm: Algorithm,
    self_cross_policy: SelfCrossPolicy,
    aborted: AtomicBool,
    /// Recent maker-fill timestamps per user, consulted only under
    /// `Algorithm::MarketMakerProtection` (`spec.md` §4.1 "Pluggable
    /// algorithms").
    maker_fill_times: DashMap<String, Mutex<VecDeque<u64>>>,
}

impl OrderBook {
    /// Create a new, empty book for `symbol`.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        tick_size: Decimal,
        algorithm: Algorithm,
        self_cross_policy: SelfCrossPolicy,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            bids: SkipMap::new(),
            asks: SkipMap::new(),
            order_locations: DashMap::new(),
            user_orders: DashMap::new(),
            terminal_orders: DashMap::new(),
            pending_stops: Mutex::new(Vec::new()),
            trade_sequence: SequenceCounter::new(),
            snapshot_sequence: SequenceCounter::new(),
            last_trade_price: Mutex::new(None),
            algorithm,
            self_cross_policy,
            aborted: AtomicBool::new(false),
            maker_fill_times: DashMap::new(),
        }
    }

    /// The symbol this book serves.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Best (highest) resting bid price, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.back().map(|e| e.value().price())
    }

    /// Best (lowest) resting ask price, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.front().map(|e| e.value().price())
    }

    /// `true` once a `Fatal` error has aborted this symbol's state
    /// machine. Refuses further orders until external `reset`
    /// (supervisor-mediated) clears it.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn abort(&self, reason: &str) {
        warn!(symbol = %self.symbol, reason, "order book aborted");
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Submit a new order. Ingress validation is synchronous; a rejected
    /// order produces no state change and no trade (`spec.md` §4.1
    /// "Failure semantics").
    pub fn submit(&self, mut order: Order) -> Result<SubmitOutcome, EngineError> {
        if self.is_aborted() {
            return Err(EngineError::SymbolAborted(self.symbol.clone()));
        }
        self.validate(&order)?;

        if matches!(order.kind, OrderKind::Stop | OrderKind::StopLimit) {
            order.status = OrderStatus::New;
            self.pending_stops.lock().unwrap().push(order.clone());
            return Ok(SubmitOutcome {
                order,
                trades: Vec::new(),
            });
        }

        if order.time_in_force == TimeInForce::Fok && !self.can_fully_fill(&order) {
            order.status = OrderStatus::Rejected;
            self.terminal_orders.insert(order.id, OrderStatus::Rejected);
            return Ok(SubmitOutcome {
                order,
                trades: Vec::new(),
            });
        }

        let mut trades = Vec::new();
        match self.sweep(&mut order) {
            Ok(mut t) => trades.append(&mut t),
            Err(EngineError::SymbolAborted(_)) => {
                self.abort("matching algorithm error contained to this order");
                return Err(EngineError::SymbolAborted(self.symbol.clone()));
            }
            Err(e) => return Err(e),
        }

        self.finalize_after_sweep(&mut order);
        let triggered = self.check_stop_triggers();
        for t in triggered {
            trades.extend(t);
        }

        Ok(SubmitOutcome { order, trades })
    }

    fn finalize_after_sweep(&self, order: &mut Order) {
        let never_rests = order.kind == OrderKind::Market
            || matches!(order.time_in_force, TimeInForce::Ioc | TimeInForce::Fok);

        if order.remaining().is_zero() {
            order.status = OrderStatus::Filled;
            self.terminal_orders.insert(order.id, OrderStatus::Filled);
        } else if never_rests {
            order.status = OrderStatus::Canceled;
            self.terminal_orders.insert(order.id, OrderStatus::Canceled);
        } else {
            order.status = if order.filled.is_zero() {
                OrderStatus::New
            } else {
                OrderStatus::PartiallyFilled
            };
            self.rest_order(order.clone());
        }
    }

    fn validate(&self, order: &Order) -> Result<(), EngineError> {
        if order.symbol != self.symbol {
            return Err(EngineError::UnknownSymbol(order.symbol.clone()));
        }
        if order.quantity.is_zero() {
            return Err(EngineError::MalformedOrder("quantity must be positive".into()));
        }
        match order.kind {
            OrderKind::Limit | OrderKind::Iceberg => {
                if order.price.is_none() {
                    return Err(EngineError::MalformedOrder(
                        "limit/iceberg orders require a price".into(),
                    ));
                }
            }
            OrderKind::Market => {}
            OrderKind::Stop => {
                if order.stop_price.is_none() {
                    return Err(EngineError::MalformedOrder(
                        "stop orders require a stop_price".into(),
                    ));
                }
            }
            OrderKind::StopLimit => {
                if order.stop_price.is_none() || order.price.is_none() {
                    return Err(EngineError::MalformedOrder(
                        "stop-limit orders require both price and stop_price".into(),
                    ));
                }
            }
        }
        if order.kind == OrderKind::Iceberg && order.iceberg.is_none() {
            return Err(EngineError::MalformedOrder(
                "iceberg orders require iceberg display state".into(),
            ));
        }
        if let Some(price) = order.price {
            if !self.is_tick_aligned(price) {
                return Err(EngineError::MalformedOrder(format!(
                    "price {price} is not a multiple of tick size {}",
                    self.tick_size
                )));
            }
        }
        if let Some(stop_price) = order.stop_price {
            if !self.is_tick_aligned(stop_price) {
                return Err(EngineError::MalformedOrder(format!(
                    "stop_price {stop_price} is not a multiple of tick size {}",
                    self.tick_size
                )));
            }
        }
        Ok(())
    }

    /// `true` if `price` is an exact multiple of `self.tick_size`; guards
    /// `to_tick_key`'s integer division from silently truncating a
    /// non-aligned price into the wrong bucket.
    fn is_tick_aligned(&self, price: Price) -> bool {
        let ticks = price.as_decimal() / self.tick_size;
        ticks == ticks.trunc()
    }

    fn tick_key(&self, price: Price) -> u128 {
        price.to_tick_key(self.tick_size)
    }

    fn rest_order(&self, order: Order) {
        let price = order.price.expect("resting orders always carry a price");
        let key = self.tick_key(price);
        let side = order.side;
        let map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let level = map
            .get_or_insert_with(key, || Arc::new(PriceLevel::new(price)))
            .value()
            .clone();
        level.push_back(order.clone());
        self.order_locations.insert(order.id, (key, side));
        self.user_orders
            .entry(order.user_id.clone())
            .or_default()
            .push(order.id);
    }

    fn opposite_map(&self, side: Side) -> &SkipMap<u128, Arc<PriceLevel>> {
        match side.opposite() {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn best_opposite_key(&self, side: Side) -> Option<u128> {
        match side.opposite() {
            Side::Buy => self.bids.back().map(|e| *e.key()),
            Side::Sell => self.asks.front().map(|e| *e.key()),
        }
    }

    fn crosses(&self, incoming_side: Side, limit: Option<Price>, level_price: Price) -> bool {
        match limit {
            None => true, // market order: crosses unconditionally
            Some(limit) => match incoming_side {
                Side::Buy => level_price.as_decimal() <= limit.as_decimal(),
                Side::Sell => level_price.as_decimal() >= limit.as_decimal(),
            },
        }
    }

    /// Core sweep loop. Dispatches to the pro-rata allocator for symbols
    /// configured with `Algorithm::ProRata` and to [`Self::sweep_auction`]
    /// for `Algorithm::Auction`; every other algorithm (including
    /// `MarketMakerProtection`, whose quote-pulling is enforced inside
    /// [`Self::sweep_one_head`] after every maker fill) uses sequential
    /// price-time consumption of the head of each level.
    fn sweep(&self, incoming: &mut Order) -> Result<Vec<Trade>, EngineError> {
        if matches!(self.algorithm, Algorithm::Auction) {
            return self.sweep_auction(incoming);
        }

        let mut trades = Vec::new();
        let stp_mode = self.self_cross_policy.to_stp_mode();

        loop {
            if incoming.remaining().is_zero() {
                break;
            }
            let Some(key) = self.best_opposite_key(incoming.side) else {
                break;
            };
            let map = self.opposite_map(incoming.side);
            let Some(entry) = map.get(&key) else { continue };
            let level = entry.value().clone();

            if !self.crosses(incoming.side, incoming.price, level.price()) {
                break;
            }
            if level.is_empty() {
                map.remove(&key);
                continue;
            }

            match &self.algorithm {
                Algorithm::ProRata { min_fill_floor } => {
                    let min_fill_floor = *min_fill_floor;
                    let candidates: Vec<ProRataCandidate> = level
                        .snapshot_orders()
                        .into_iter()
                        .filter(|o| stp_mode == STPMode::None || o.user_id != incoming.user_id)
                        .map(|o| ProRataCandidate {
                            order_id: o.id,
                            available: o.remaining(),
                        })
                        .collect();
                    let allocations = allocate_pro_rata(incoming.remaining(), &candidates, min_fill_floor);
                    if allocations.is_empty() {
                        // No one above the floor: fall back to price-time for this pass.
                        self.sweep_one_head(incoming, &level, stp_mode, level.price(), &mut trades)?;
                    } else {
                        for (maker_id, qty) in allocations {
                            self.apply_allocation(incoming, &level, maker_id, qty, &mut trades);
                            if incoming.remaining().is_zero() {
                                break;
                            }
                        }
                    }
                }
                _ => {
                    self.sweep_one_head(incoming, &level, stp_mode, level.price(), &mut trades)?;
                }
            }

            if level.is_empty() {
                map.remove(&key);
            }
        }

        Ok(trades)
    }

    /// Batch-auction sweep for `Algorithm::Auction`: this admission's
    /// clearing price is computed once, over the resting book plus the
    /// incoming order (via [`clearing_price`]), and every resulting trade
    /// executes at that single price rather than at each maker's own
    /// resting price (`spec.md` §4.1 "Auction").
    fn sweep_auction(&self, incoming: &mut Order) -> Result<Vec<Trade>, EngineError> {
        let mut trades = Vec::new();
        let stp_mode = self.self_cross_policy.to_stp_mode();

        let mut bid_levels: Vec<(Price, Quantity)> = self
            .bids
            .iter()
            .map(|e| (e.value().price(), e.value().visible_quantity()))
            .collect();
        let mut ask_levels: Vec<(Price, Quantity)> = self
            .asks
            .iter()
            .map(|e| (e.value().price(), e.value().visible_quantity()))
            .collect();

        // A marketable (unpriced) incoming order joins the batch at the
        // most aggressive possible price so it never constrains the
        // clearing price away from what the resting book alone would
        // produce.
        let incoming_price = incoming.price.unwrap_or(match incoming.side {
            Side::Buy => Price::new(Decimal::MAX),
            Side::Sell => Price::new(Decimal::ZERO),
        });
        match incoming.side {
            Side::Buy => bid_levels.push((incoming_price, incoming.remaining())),
            Side::Sell => ask_levels.push((incoming_price, incoming.remaining())),
        }

        let Some((clearing, _)) = clearing_price(&bid_levels, &ask_levels) else {
            return Ok(trades);
        };
        if !self.crosses(incoming.side, incoming.price, clearing) {
            return Ok(trades);
        }

        loop {
            if incoming.remaining().is_zero() {
                break;
            }
            let Some(key) = self.best_opposite_key(incoming.side) else {
                break;
            };
            let map = self.opposite_map(incoming.side);
            let Some(entry) = map.get(&key) else { continue };
            let level = entry.value().clone();
            if level.is_empty() {
                map.remove(&key);
                continue;
            }
            // Only levels at least as aggressive as the clearing price
            // participate in this batch.
            if !self.crosses(incoming.side, Some(clearing), level.price()) {
                break;
            }

            self.sweep_one_head(incoming, &level, stp_mode, clearing, &mut trades)?;

            if level.is_empty() {
                map.remove(&key);
            }
        }

        Ok(trades)
    }

    /// Consume (or bounce) the order at the head of `level` once,
    /// applying the configured STP mode. `execution_price` is the maker's
    /// own price for price-time sweeps, or the batch clearing price for
    /// `Algorithm::Auction`.
    fn sweep_one_head(
        &self,
        incoming: &mut Order,
        level: &Arc<PriceLevel>,
        stp_mode: STPMode,
        execution_price: Price,
        trades: &mut Vec<Trade>,
    ) -> Result<(), EngineError> {
        let Some(front) = level.front() else {
            return Ok(());
        };

        if stp_mode.is_enabled() && !incoming.user_id.is_empty() && front.user_id == incoming.user_id {
            match stp_mode {
                STPMode::CancelTaker => {
                    incoming.filled = incoming.quantity; // stop sweeping: treat remainder as consumed-by-cancel
                    return Ok(());
                }
                STPMode::CancelMaker => {
                    level.remove(front.id);
                    self.order_locations.remove(&front.id);
                    self.terminal_orders.insert(front.id, OrderStatus::Canceled);
                    return Ok(());
                }
                STPMode::CancelBoth => {
                    level.remove(front.id);
                    self.order_locations.remove(&front.id);
                    self.terminal_orders.insert(front.id, OrderStatus::Canceled);
                    incoming.filled = incoming.quantity;
                    return Ok(());
                }
                STPMode::None => unreachable!(),
            }
        }

        let maker_available = match &front.iceberg {
            Some(state) => state.current_slice().min(front.remaining()),
            None => front.remaining(),
        };
        let trade_qty = incoming.remaining().min(maker_available);
        self.commit_trade(incoming, &front, trade_qty, execution_price, trades);

        // `with_front_mut` hands back the pre-mutation snapshot, so decide
        // the post-trade depletion outcome from what we already know about
        // `front` before calling it.
        let remaining_after = front.remaining() - trade_qty;
        let depletes_fully = match &front.iceberg {
            Some(state) => (state.total_remaining - trade_qty).is_zero(),
            None => remaining_after.is_zero(),
        };

        let refill = level.with_front_mut(|maker| {
            maker.filled = maker.filled + trade_qty;
            if let Some(state) = &mut maker.iceberg {
                state.total_remaining = maker.remaining();
            }
            if maker.remaining().is_zero() {
                if let Some(state) = &maker.iceberg {
                    if !state.total_remaining.is_zero() {
                        return RefillAction::RequeueAtTail;
                    }
                }
                RefillAction::Remove
            } else {
                RefillAction::KeepAtFront
            }
        });

        if refill.is_some() && depletes_fully {
            self.order_locations.remove(&front.id);
            self.terminal_orders.insert(front.id, OrderStatus::Filled);
        }

        self.record_maker_fill_and_maybe_pull_quotes(&front.user_id);

        Ok(())
    }

    /// Under `Algorithm::MarketMakerProtection`, track this maker's recent
    /// fills in a rolling window and pull their remaining resting orders
    /// on this symbol once the fill rate exceeds the configured threshold
    /// (`spec.md` §4.1 "Pluggable algorithms"). A no-op under every other
    /// algorithm.
    fn record_maker_fill_and_maybe_pull_quotes(&self, maker_user_id: &str) {
        let Algorithm::MarketMakerProtection {
            max_fills_per_window,
            window_millis,
        } = &self.algorithm
        else {
            return;
        };
        let max_fills_per_window = *max_fills_per_window;
        let window_millis = *window_millis;
        let now = Order::now_millis();

        let exceeded = {
            let times_ref = self
                .maker_fill_times
                .entry(maker_user_id.to_string())
                .or_insert_with(|| Mutex::new(VecDeque::new()));
            let mut times = times_ref.lock().unwrap();
            times.push_back(now);
            while times.front().is_some_and(|t| now.saturating_sub(*t) > window_millis) {
                times.pop_front();
            }
            times.len() as u32 > max_fills_per_window
        };

        if exceeded {
            warn!(
                symbol = %self.symbol,
                user_id = maker_user_id,
                "market maker protection threshold exceeded, pulling quotes"
            );
            self.mass_cancel(maker_user_id);
        }
    }

    fn apply_allocation(
        &self,
        incoming: &mut Order,
        level: &Arc<PriceLevel>,
        maker_id: OrderId,
        qty: Quantity,
        trades: &mut Vec<Trade>,
    ) {
        let Some(maker) = level
            .snapshot_orders()
            .into_iter()
            .find(|o| o.id == maker_id)
        else {
            return;
        };
        let price = maker.price.expect("resting orders always carry a price");
        self.commit_trade(incoming, &maker, qty, price, trades);
        let remove = {
            let mut removed = false;
            let orders = level.snapshot_orders();
            if let Some(mut updated) = orders.into_iter().find(|o| o.id == maker_id) {
                updated.filled = updated.filled + qty;
                if updated.remaining().is_zero() {
                    removed = true;
                } else {
                    level.replace_in_place(maker_id, updated);
                }
            }
            removed
        };
        if remove {
            level.remove(maker_id);
            self.order_locations.remove(&maker_id);
            self.terminal_orders.insert(maker_id, OrderStatus::Filled);
        }
    }

    fn commit_trade(&self, incoming: &mut Order, maker: &Order, qty: Quantity, price: Price, trades: &mut Vec<Trade>) {
        if qty.is_zero() {
            return;
        }
        incoming.filled = incoming.filled + qty;
        let now = Order::now_millis();
        let mut last_price = self.last_trade_price.lock().unwrap();
        *last_price = Some(price);
        drop(last_price);

        let trade = Trade {
            id: TradeId::new(),
            symbol: self.symbol.clone(),
            price,
            quantity: qty,
            taker_side: incoming.side,
            maker_order_id: maker.id,
            taker_order_id: incoming.id,
            timestamp: now,
            sequence: self.trade_sequence.next(),
        };
        trace!(symbol = %self.symbol, sequence = trade.sequence, "trade committed");
        trades.push(trade);
    }

    /// Two-phase fill-or-kill feasibility check: aggregate available
    /// opposite-side quantity that would cross, without mutating state.
    fn can_fully_fill(&self, order: &Order) -> bool {
        let map = self.opposite_map(order.side);
        let mut available = Quantity::zero();
        for entry in map.iter() {
            let level = entry.value();
            if !self.crosses(order.side, order.price, level.price()) {
                if matches!(order.side, Side::Buy) {
                    break; // asks ascending: once we stop crossing, no deeper level will cross
                } else {
                    continue;
                }
            }
            available = available + level.visible_quantity();
            if available.as_decimal() >= order.quantity.as_decimal() {
                return true;
            }
        }
        available.as_decimal() >= order.quantity.as_decimal()
    }

    fn check_stop_triggers(&self) -> Vec<Vec<Trade>> {
        let Some(last_price) = *self.last_trade_price.lock().unwrap() else {
            return Vec::new();
        };
        let mut results = Vec::new();
        loop {
            let triggered = {
                let mut pending = self.pending_stops.lock().unwrap();
                let mut triggered = Vec::new();
                pending.retain(|o| {
                    let Some(stop) = o.stop_price else {
                        return true;
                    };
                    let fires = match o.side {
                        Side::Buy => last_price.as_decimal() >= stop.as_decimal(),
                        Side::Sell => last_price.as_decimal() <= stop.as_decimal(),
                    };
                    if fires {
                        triggered.push(o.clone());
                        false
                    } else {
                        true
                    }
                });
                triggered
            };
            if triggered.is_empty() {
                break;
            }
            for mut order in triggered {
                order.kind = if order.kind == OrderKind::Stop {
                    OrderKind::Market
                } else {
                    OrderKind::Limit
                };
                if let Ok(mut trades) = self.sweep(&mut order) {
                    self.finalize_after_sweep(&mut order);
                    results.push(std::mem::take(&mut trades));
                }
            }
        }
        results
    }

    /// Cancel a resting order. Idempotent: canceling an already-canceled
    /// or filled order is a no-op returning the current terminal state.
    pub fn cancel(&self, order_id: OrderId) -> CancelOutcome {
        match self.cancel_internal(order_id) {
            Some(order) => CancelOutcome::Canceled(order),
            None => match self.terminal_orders.get(&order_id) {
                Some(status) => CancelOutcome::AlreadyTerminal(*status),
                None => CancelOutcome::NotFound,
            },
        }
    }

    fn cancel_internal(&self, order_id: OrderId) -> Option<Order> {
        let (key, side) = *self.order_locations.get(&order_id)?.value();
        self.order_locations.remove(&order_id);
        let map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let level = map.get(&key)?.value().clone();
        let mut order = level.remove(order_id)?;
        order.status = OrderStatus::Canceled;
        self.terminal_orders.insert(order_id, OrderStatus::Canceled);
        if level.is_empty() {
            map.remove(&key);
        }
        Some(order)
    }

    fn find_current(&self, order_id: OrderId) -> Option<(u128, Side, Order)> {
        let (key, side) = *self.order_locations.get(&order_id)?.value();
        let map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let level = map.get(&key)?.value().clone();
        let order = level.snapshot_orders().into_iter().find(|o| o.id == order_id)?;
        Some((key, side, order))
    }

    /// Modify a resting order. Semantically equivalent to cancel-then-
    /// submit; retains the original id only when the new quantity does
    /// not exceed the current remaining quantity and the price is
    /// unchanged (`spec.md` §9 Open Question (b), resolved in
    /// `DESIGN.md`).
    pub fn modify(
        &self,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<Quantity>,
    ) -> Result<ModifyOutcome, EngineError> {
        let Some((key, side, current)) = self.find_current(order_id) else {
            return Ok(match self.terminal_orders.get(&order_id) {
                Some(status) => ModifyOutcome::AlreadyTerminal(*status),
                None => ModifyOutcome::NotFound,
            });
        };

        let price_unchanged = new_price.is_none_or(|p| current.price == Some(p));
        let quantity_decreased_or_same = new_quantity.is_none_or(|q| q.as_decimal() <= current.remaining().as_decimal());
        let retains_priority = price_unchanged && quantity_decreased_or_same;

        if retains_priority {
            let mut updated = current.clone();
            if let Some(q) = new_quantity {
                updated.quantity = updated.filled + q;
                if let Some(state) = &mut updated.iceberg {
                    *state = IcebergState::new(q, state.display_quantity);
                }
            }
            let map = match side {
                Side::Buy => &self.bids,
                Side::Sell => &self.asks,
            };
            if let Some(level) = map.get(&key) {
                level.value().replace_in_place(order_id, updated.clone());
            }
            Ok(ModifyOutcome::Modified {
                order_id,
                order: updated,
            })
        } else {
            self.cancel_internal(order_id);
            let mut new_order = current.clone();
            new_order.id = OrderId::new();
            new_order.created_at = Order::now_millis();
            new_order.status = OrderStatus::New;
            let remaining = current.remaining();
            new_order.quantity = new_quantity.unwrap_or(remaining);
            new_order.filled = Quantity::zero();
            if let Some(p) = new_price {
                new_order.price = Some(p);
            }
            if let Some(state) = &mut new_order.iceberg {
                *state = IcebergState::new(new_order.quantity, state.display_quantity);
            }
            let outcome = self.submit(new_order)?;
            Ok(ModifyOutcome::Replaced {
                old_order_id: order_id,
                new_order_id: outcome.order.id,
                order: outcome.order,
                trades: outcome.trades,
            })
        }
    }

    /// Top-`depth` aggregated bid/ask levels plus a monotonically
    /// increasing snapshot sequence number.
    #[must_use]
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let sequence = self.snapshot_sequence.next();
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|e| LevelAgg {
                price: e.value().price(),
                quantity: e.value().visible_quantity(),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|e| LevelAgg {
                price: e.value().price(),
                quantity: e.value().visible_quantity(),
            })
            .collect();
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids,
            asks,
            sequence,
        }
    }

    /// Mass-cancel every resting order owned by `user_id`. Used for
    /// account-level risk interventions and client disconnects.
    pub fn mass_cancel(&self, user_id: &str) -> Vec<Order> {
        let ids = self
            .user_orders
            .get(user_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        let mut canceled = Vec::new();
        for id in ids {
            if let Some(order) = self.cancel_internal(id) {
                canceled.push(order);
            }
        }
        self.user_orders.remove(user_id);
        canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::order::{OrderKind, TimeInForce};
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        OrderBook::new("BTC-USD", dec!(0.01), Algorithm::PriceTime, SelfCrossPolicy::Allow)
    }

    fn limit_order(side: Side, price: Decimal, qty: Decimal, user: &str) -> Order {
        Order {
            id: OrderId::new(),
            symbol: "BTC-USD".into(),
            side,
            kind: OrderKind::Limit,
            time_in_force: TimeInForce::Gtc,
            price: Some(Price::new(price)),
            stop_price: None,
            quantity: Quantity::new(qty),
            filled: Quantity::zero(),
            iceberg: None,
            user_id: user.into(),
            client_order_id: "c".into(),
            created_at: 0,
            status: OrderStatus::New,
        }
    }

    #[test]
    fn price_time_priority_scenario() {
        let book = book();
        let a = limit_order(Side::Buy, dec!(100), dec!(5), "u1");
        let a_id = a.id;
        let b = limit_order(Side::Buy, dec!(100), dec!(5), "u2");
        let b_id = b.id;
        book.submit(a).unwrap();
        book.submit(b).unwrap();

        let incoming = limit_order(Side::Sell, dec!(100), dec!(7), "u3");
        let outcome = book.submit(incoming).unwrap();

        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].maker_order_id, a_id);
        assert_eq!(outcome.trades[0].quantity.as_decimal(), dec!(5));
        assert_eq!(outcome.trades[1].maker_order_id, b_id);
        assert_eq!(outcome.trades[1].quantity.as_decimal(), dec!(2));
    }

    #[test]
    fn non_tick_aligned_price_is_rejected() {
        let book = book();
        let order = limit_order(Side::Buy, dec!(100.005), dec!(5), "u1");
        let err = book.submit(order).unwrap_err();
        assert!(matches!(err, EngineError::MalformedOrder(_)));
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn fok_reject_leaves_book_unchanged() {
        let book = book();
        book.submit(limit_order(Side::Sell, dec!(101), dec!(3), "m1")).unwrap();
        book.submit(limit_order(Side::Sell, dec!(102), dec!(2), "m2")).unwrap();

        let mut incoming = limit_order(Side::Buy, dec!(102), dec!(10), "taker");
        incoming.time_in_force = TimeInForce::Fok;
        let outcome = book.submit(incoming).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.order.status, OrderStatus::Rejected);
        assert_eq!(book.best_ask().unwrap().as_decimal(), dec!(101));
    }

    #[test]
    fn iceberg_refill_loses_time_priority() {
        let book = book();
        let mut resting = limit_order(Side::Sell, dec!(50), dec!(10), "maker");
        resting.kind = OrderKind::Iceberg;
        resting.iceberg = Some(IcebergState::new(Quantity::new(dec!(10)), Quantity::new(dec!(3))));
        book.submit(resting).unwrap();

        for _ in 0..3 {
            let taker = limit_order(Side::Buy, dec!(50), dec!(3), "taker");
            let outcome = book.submit(taker).unwrap();
            assert_eq!(outcome.trades.len(), 1);
            assert_eq!(outcome.trades[0].quantity.as_decimal(), dec!(3));
        }

        // Final slice (qty=1) remains.
        let taker = limit_order(Side::Buy, dec!(50), dec!(1), "taker");
        let outcome = book.submit(taker).unwrap();
        assert_eq!(outcome.trades[0].quantity.as_decimal(), dec!(1));
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn market_order_against_empty_side_cancels_remainder() {
        let book = book();
        let mut incoming = limit_order(Side::Buy, dec!(0), dec!(5), "taker");
        incoming.kind = OrderKind::Market;
        incoming.price = None;
        let outcome = book.submit(incoming).unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Canceled);
        assert!(outcome.order.filled.is_zero());
    }

    #[test]
    fn cancel_of_filled_order_is_noop_returning_terminal_state() {
        let book = book();
        let resting = limit_order(Side::Sell, dec!(50), dec!(1), "maker");
        let resting_id = resting.id;
        book.submit(resting).unwrap();
        book.submit(limit_order(Side::Buy, dec!(50), dec!(1), "taker")).unwrap();

        match book.cancel(resting_id) {
            CancelOutcome::AlreadyTerminal(OrderStatus::Filled) => {}
            other => panic!("expected AlreadyTerminal(Filled), got {other:?}"),
        }
    }

    #[test]
    fn modify_quantity_decrease_retains_priority() {
        let book = book();
        let resting = limit_order(Side::Buy, dec!(100), dec!(5), "maker");
        let id = resting.id;
        book.submit(resting).unwrap();

        let outcome = book.modify(id, None, Some(Quantity::new(dec!(2)))).unwrap();
        match outcome {
            ModifyOutcome::Modified { order_id, order } => {
                assert_eq!(order_id, id);
                assert_eq!(order.remaining().as_decimal(), dec!(2));
            }
            other => panic!("expected Modified, got {other:?}"),
        }
    }

    #[test]
    fn modify_price_change_loses_priority_and_gets_new_id() {
        let book = book();
        let resting = limit_order(Side::Buy, dec!(100), dec!(5), "maker");
        let id = resting.id;
        book.submit(resting).unwrap();

        let outcome = book.modify(id, Some(Price::new(dec!(101))), None).unwrap();
        match outcome {
            ModifyOutcome::Replaced { old_order_id, new_order_id, .. } => {
                assert_eq!(old_order_id, id);
                assert_ne!(new_order_id, id);
            }
            other => panic!("expected Replaced, got {other:?}"),
        }
    }

    #[test]
    fn best_bid_never_exceeds_best_ask() {
        let book = book();
        book.submit(limit_order(Side::Buy, dec!(99), dec!(1), "b")).unwrap();
        book.submit(limit_order(Side::Sell, dec!(101), dec!(1), "s")).unwrap();
        assert!(book.best_bid().unwrap().as_decimal() < book.best_ask().unwrap().as_decimal());
    }

    #[test]
    fn pro_rata_distributes_across_resting_orders() {
        let book = OrderBook::new(
            "BTC-USD",
            dec!(0.01),
            Algorithm::ProRata {
                min_fill_floor: Quantity::zero(),
            },
            SelfCrossPolicy::Allow,
        );
        book.submit(limit_order(Side::Sell, dec!(100), dec!(60), "m1")).unwrap();
        book.submit(limit_order(Side::Sell, dec!(100), dec!(40), "m2")).unwrap();

        let outcome = book.submit(limit_order(Side::Buy, dec!(100), dec!(10), "taker")).unwrap();
        let total: Decimal = outcome.trades.iter().map(|t| t.quantity.as_decimal()).sum();
        assert_eq!(total, dec!(10));
    }

    #[test]
    fn auction_executes_every_trade_at_a_single_clearing_price() {
        let book = OrderBook::new("BTC-USD", dec!(0.01), Algorithm::Auction, SelfCrossPolicy::Allow);
        book.submit(limit_order(Side::Buy, dec!(101), dec!(3), "b1")).unwrap();
        book.submit(limit_order(Side::Buy, dec!(100), dec!(3), "b2")).unwrap();

        // A single incoming sell sweeps both resting bids; the clearing
        // price (100) differs from b1's own resting price (101), proving
        // execution happens at the batch price, not each maker's own.
        let outcome = book.submit(limit_order(Side::Sell, dec!(99), dec!(6), "s2")).unwrap();
        assert_eq!(outcome.trades.len(), 2);
        let prices: Vec<Decimal> = outcome.trades.iter().map(|t| t.price.as_decimal()).collect();
        assert!(prices.iter().all(|p| *p == dec!(100)));
    }

    #[test]
    fn market_maker_protection_pulls_quotes_past_the_fill_rate_threshold() {
        let book = OrderBook::new(
            "BTC-USD",
            dec!(0.01),
            Algorithm::MarketMakerProtection {
                max_fills_per_window: 1,
                window_millis: 60_000,
            },
            SelfCrossPolicy::Allow,
        );
        book.submit(limit_order(Side::Sell, dec!(100), dec!(2), "mm")).unwrap();
        book.submit(limit_order(Side::Sell, dec!(101), dec!(2), "mm")).unwrap();

        // First taker fill is within the allowance.
        book.submit(limit_order(Side::Buy, dec!(100), dec!(1), "taker1")).unwrap();
        assert_eq!(book.snapshot(10).asks.len(), 2);

        // Second fill within the window exceeds max_fills_per_window and
        // pulls the maker's untouched second quote too, not just the one
        // that just traded.
        book.submit(limit_order(Side::Buy, dec!(100), dec!(1), "taker2")).unwrap();
        assert!(book.snapshot(10).asks.is_empty());
    }
}

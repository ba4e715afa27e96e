//! A single price level: a FIFO queue of resting orders plus an aggregate
//! visible quantity, grounded on the teacher's `PriceLevel` concept
//! (previously provided by the external `pricelevel` crate, now owned
//! in-crate — see `DESIGN.md`).

use crate::common::{OrderId, Price, Quantity};
use crate::engine::order::Order;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A FIFO queue of resting orders at a single price, with the invariant
/// that the aggregate `visible_quantity` always equals the sum of the
/// displayed remaining quantity of its queued orders (`spec.md` §3,
/// OrderBook invariant (b)).
#[derive(Debug)]
pub struct PriceLevel {
    price: Price,
    orders: Mutex<VecDeque<Order>>,
}

impl PriceLevel {
    /// Create an empty price level at the given price.
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: Mutex::new(VecDeque::new()),
        }
    }

    /// The price this level represents.
    #[must_use]
    pub fn price(&self) -> Price {
        self.price
    }

    /// Append an order to the tail of the queue (time priority: later
    /// arrival, later fill).
    pub fn push_back(&self, order: Order) {
        self.orders.lock().unwrap().push_back(order);
    }

    /// Number of resting orders at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    /// Returns `true` if this level has no resting orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate displayed (visible) remaining quantity across all queued
    /// orders — iceberg orders contribute only their current slice.
    #[must_use]
    pub fn visible_quantity(&self) -> Quantity {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .map(|o| match &o.iceberg {
                Some(state) => state.current_slice().min(o.remaining()),
                None => o.remaining(),
            })
            .fold(Quantity::zero(), |acc, q| acc + q)
    }

    /// Peek at the order at the head of the queue, if any.
    #[must_use]
    pub fn front(&self) -> Option<Order> {
        self.orders.lock().unwrap().front().cloned()
    }

    /// Run `f` against the head order's mutable slot, removing it from the
    /// queue if `f` returns `true` (order fully depleted or cancelled). If
    /// `requeue_front` is set on the returned [`RefillAction`], the order
    /// (updated) is instead moved to the tail of the same level — used for
    /// iceberg slice refills, which lose time priority.
    pub fn with_front_mut<F>(&self, f: F) -> Option<Order>
    where
        F: FnOnce(&mut Order) -> RefillAction,
    {
        let mut guard = self.orders.lock().unwrap();
        let mut order = guard.pop_front()?;
        let result_order = order.clone();
        match f(&mut order) {
            RefillAction::Remove => {}
            RefillAction::KeepAtFront => guard.push_front(order),
            RefillAction::RequeueAtTail => guard.push_back(order),
        }
        Some(result_order)
    }

    /// Remove a specific order by id, wherever it sits in the queue
    /// (cancel does not require it to be at the front).
    pub fn remove(&self, id: OrderId) -> Option<Order> {
        let mut guard = self.orders.lock().unwrap();
        let pos = guard.iter().position(|o| o.id == id)?;
        guard.remove(pos)
    }

    /// Replace an order in place (used by `modify` when time priority is
    /// retained — see `engine::book::OrderBook::modify`).
    pub fn replace_in_place(&self, id: OrderId, updated: Order) -> bool {
        let mut guard = self.orders.lock().unwrap();
        if let Some(slot) = guard.iter_mut().find(|o| o.id == id) {
            *slot = updated;
            true
        } else {
            false
        }
    }

    /// Snapshot all resting orders in FIFO order, for iteration by
    /// matching algorithms that need visibility across the whole level
    /// (pro-rata, auction).
    #[must_use]
    pub fn snapshot_orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().iter().cloned().collect()
    }
}

/// What to do with the head order after a matching pass touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillAction {
    /// The order is fully depleted or terminal; drop it from the level.
    Remove,
    /// The order still has displayed quantity left; keep it at the front.
    KeepAtFront,
    /// An iceberg slice was depleted and refilled; move to the tail,
    /// losing time priority relative to orders that arrived during
    /// depletion (`spec.md` §4.1 "Iceberg").
    RequeueAtTail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::order::{OrderKind, OrderStatus, Side, TimeInForce};
    use rust_decimal_macros::dec;

    fn make_order(qty: &str) -> Order {
        Order {
            id: OrderId::new(),
            symbol: "BTC-USD".into(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            time_in_force: TimeInForce::Gtc,
            price: Some(Price::new(dec!(100))),
            stop_price: None,
            quantity: Quantity::new(qty.parse().unwrap()),
            filled: Quantity::zero(),
            iceberg: None,
            user_id: "u1".into(),
            client_order_id: "c1".into(),
            created_at: 0,
            status: OrderStatus::New,
        }
    }

    #[test]
    fn visible_quantity_sums_queued_orders() {
        let level = PriceLevel::new(Price::new(dec!(100)));
        level.push_back(make_order("5"));
        level.push_back(make_order("3"));
        assert_eq!(level.visible_quantity().as_decimal(), dec!(8));
    }

    #[test]
    fn fifo_order_is_preserved() {
        let level = PriceLevel::new(Price::new(dec!(100)));
        let first = make_order("5");
        let second = make_order("3");
        let first_id = first.id;
        level.push_back(first);
        level.push_back(second);
        assert_eq!(level.front().unwrap().id, first_id);
    }

    #[test]
    fn requeue_at_tail_loses_time_priority() {
        let level = PriceLevel::new(Price::new(dec!(100)));
        let first = make_order("5");
        let first_id = first.id;
        let second = make_order("3");
        let second_id = second.id;
        level.push_back(first);
        level.push_back(second);

        level.with_front_mut(|_| RefillAction::RequeueAtTail);
        assert_eq!(level.front().unwrap().id, second_id);
        let orders = level.snapshot_orders();
        assert_eq!(orders.last().unwrap().id, first_id);
    }
}

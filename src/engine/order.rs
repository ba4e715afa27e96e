//! Order data model (`spec.md` §3 "Order").

use crate::common::{OrderId, Price, Quantity};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which side of the book an order rests on or sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// A resting or incoming buy order.
    Buy,
    /// A resting or incoming sell order.
    Sell,
}

impl Side {
    /// The opposite side, used to find the resting book an incoming order
    /// sweeps against.
    #[must_use]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Time-in-force policy, `spec.md` §3 / GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-till-cancelled: rests on the book until filled or cancelled.
    Gtc,
    /// Immediate-or-cancel: fills what it can immediately, cancels the rest.
    Ioc,
    /// Fill-or-kill: fills completely immediately or not at all.
    Fok,
    /// Rests until the end of the trading day, then expires.
    Day,
}

/// Order type, `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Resting limit order at a specified price.
    Limit,
    /// Market order: sweeps without a limit price.
    Market,
    /// Stop order: becomes a market order once `stop_price` trades through.
    Stop,
    /// Stop-limit order: becomes a limit order once `stop_price` trades
    /// through.
    StopLimit,
    /// Iceberg order: only `display_quantity` participates in priority
    /// queueing at any moment.
    Iceberg,
}

/// Lifecycle status of an order, `spec.md` §3 state machine.
///
/// `Filled` and `Canceled` (and `Rejected`/`Expired`) are absorbing:
/// terminal states accept no further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Admitted, not yet matched at all.
    New,
    /// Admitted and partially matched; remainder still resting.
    PartiallyFilled,
    /// Fully matched. `filled == quantity`.
    Filled,
    /// Canceled by the client, IOC sweep-end, or FOK-reject path.
    Canceled,
    /// Rejected at ingress; no state change occurred.
    Rejected,
    /// Expired (e.g. a `Day` order past market close).
    Expired,
}

impl OrderStatus {
    /// Terminal states accept no further mutation.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// Iceberg display-slice bookkeeping.
///
/// Resolves `spec.md` §9 Open Question (a): display is capped at total on
/// construction and on every refill, so an iceberg can never expose more
/// than it has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergState {
    /// Total remaining quantity across all slices (displayed + hidden).
    pub total_remaining: Quantity,
    /// Configured display-slice size.
    pub display_quantity: Quantity,
}

impl IcebergState {
    /// Construct iceberg state, capping `display_quantity` at `total`.
    #[must_use]
    pub fn new(total: Quantity, display_quantity: Quantity) -> Self {
        Self {
            total_remaining: total,
            display_quantity: display_quantity.min(total),
        }
    }

    /// The quantity of the currently displayed slice: the smaller of the
    /// configured display size and whatever total remains.
    #[must_use]
    pub fn current_slice(&self) -> Quantity {
        self.display_quantity.min(self.total_remaining)
    }
}

/// A client- or engine-assigned order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Opaque unique order id, assigned at admission.
    pub id: OrderId,
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Order type.
    pub kind: OrderKind,
    /// Time-in-force policy.
    pub time_in_force: TimeInForce,
    /// Limit price. `None` for pure market orders.
    pub price: Option<Price>,
    /// Stop trigger price, for `Stop`/`StopLimit` orders.
    pub stop_price: Option<Price>,
    /// Total order quantity.
    pub quantity: Quantity,
    /// Quantity matched so far. Invariant: `0 <= filled <= quantity`, and
    /// `status == Filled` implies `filled == quantity`.
    pub filled: Quantity,
    /// Iceberg display-slice state, present only for `OrderKind::Iceberg`.
    pub iceberg: Option<IcebergState>,
    /// Owning user/account id, used for self-trade prevention and mass
    /// cancel.
    pub user_id: String,
    /// Client-supplied correlation id, echoed back in acks.
    pub client_order_id: String,
    /// Admission timestamp (milliseconds since epoch).
    pub created_at: u64,
    /// Current lifecycle status.
    pub status: OrderStatus,
}

impl Order {
    /// Remaining (unfilled) quantity.
    #[must_use]
    pub fn remaining(&self) -> Quantity {
        self.quantity - self.filled
    }

    /// Returns `true` if this order rests on the book for priority-queue
    /// purposes (i.e. is not terminal).
    #[must_use]
    pub fn is_resting(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Milliseconds since the Unix epoch, used for `created_at` stamping.
    #[must_use]
    pub fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

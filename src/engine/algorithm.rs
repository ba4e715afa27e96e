//! Pluggable matching algorithm selection and the pure allocation math for
//! the non-default algorithms (`spec.md` §4.1 "Pluggable algorithms").
//!
//! `OrderBook` (see `book.rs`) owns the sweep control flow, since every
//! algorithm still needs to mutate shared book state (price levels, order
//! index, sequence counter, STP). This module holds the algorithm-specific
//! *decisions* — how much to allocate to each resting order — as pure,
//! independently testable functions, plus the per-symbol [`Algorithm`]
//! selector.

use crate::common::{OrderId, Price, Quantity};
use rust_decimal::Decimal;

/// The matching algorithm capability set a symbol's book is configured
/// with, `spec.md` §4.1 "Pluggable algorithms".
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm {
    /// Default: strict price-time priority sweep.
    PriceTime,
    /// Proportional allocation across resting orders at the touched
    /// price, with a minimum fill floor; remaining dust falls back to
    /// price-time.
    ProRata {
        /// Minimum quantity any single allocation may receive before
        /// being folded into the price-time dust pass.
        min_fill_floor: Quantity,
    },
    /// Price-time sweep with iceberg refill semantics made explicit
    /// (iceberg refill is always honored regardless of algorithm, so
    /// this variant behaves identically to `PriceTime` but documents
    /// intent for symbols that are primarily iceberg-driven).
    IcebergAware,
    /// Orders admitted during a batching interval are matched at a
    /// single clearing price computed by [`clearing_price`].
    Auction,
    /// Price-time sweep with an added protective guard: a maker whose
    /// resting orders are filled more than `max_fills_per_window` times
    /// within `window_millis` has its remaining resting orders on this
    /// symbol pulled.
    MarketMakerProtection {
        /// Maximum maker fills tolerated within the window before quotes
        /// are pulled.
        max_fills_per_window: u32,
        /// Length of the rolling window, in milliseconds.
        window_millis: u64,
    },
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::PriceTime
    }
}

/// One resting order's contribution to a pro-rata allocation: its id and
/// the quantity it is eligible to provide at the touched level.
#[derive(Debug, Clone, Copy)]
pub struct ProRataCandidate {
    /// The resting order's id.
    pub order_id: OrderId,
    /// The resting order's available (visible) quantity at this level.
    pub available: Quantity,
}

/// Proportionally distribute `incoming_qty` across `candidates` in FIFO
/// order, honoring `min_fill_floor`: any candidate whose proportional
/// share would fall below the floor instead receives the floor amount
/// if available quantity remains to satisfy it, taken from whatever
/// quantity is left after floor-eligible candidates are served; any
/// candidate that cannot even meet the floor is skipped (falls back to
/// the price-time dust pass the caller performs afterward with whatever
/// `incoming_qty` remains unallocated).
#[must_use]
pub fn allocate_pro_rata(
    incoming_qty: Quantity,
    candidates: &[ProRataCandidate],
    min_fill_floor: Quantity,
) -> Vec<(OrderId, Quantity)> {
    if candidates.is_empty() || incoming_qty.is_zero() {
        return Vec::new();
    }

    let total_available: Decimal = candidates.iter().map(|c| c.available.as_decimal()).sum();
    if total_available.is_zero() {
        return Vec::new();
    }

    let incoming = incoming_qty.as_decimal();
    let mut allocations = Vec::with_capacity(candidates.len());
    let mut remaining = incoming;

    for candidate in candidates {
        let share = incoming * candidate.available.as_decimal() / total_available;
        let floor = min_fill_floor.as_decimal();
        let alloc = if share < floor {
            Decimal::ZERO
        } else {
            share.min(candidate.available.as_decimal()).min(remaining)
        };
        if alloc > Decimal::ZERO {
            allocations.push((candidate.order_id, Quantity::new(alloc)));
            remaining -= alloc;
        }
    }

    allocations
}

/// Compute the clearing price that maximizes executed volume for a batch
/// auction, `spec.md` §4.1 "Auction".
///
/// `bids`/`asks` are `(price, cumulative quantity at or better than
/// price)` pairs, already sorted by price (bids descending, asks
/// ascending is *not* required — this function sorts internally). The
/// clearing price is the price level at which the minimum of cumulative
/// bid demand and cumulative ask supply is maximized; ties are broken by
/// preferring the price closest to the midpoint of the tying range.
#[must_use]
pub fn clearing_price(
    bids: &[(Price, Quantity)],
    asks: &[(Price, Quantity)],
) -> Option<(Price, Quantity)> {
    if bids.is_empty() || asks.is_empty() {
        return None;
    }

    let mut bids_sorted = bids.to_vec();
    bids_sorted.sort_by(|a, b| b.0.as_decimal().cmp(&a.0.as_decimal()));
    let mut asks_sorted = asks.to_vec();
    asks_sorted.sort_by(|a, b| a.0.as_decimal().cmp(&b.0.as_decimal()));

    // Candidate clearing prices are every distinct price present on
    // either side.
    let mut candidate_prices: Vec<Decimal> = bids_sorted
        .iter()
        .map(|(p, _)| p.as_decimal())
        .chain(asks_sorted.iter().map(|(p, _)| p.as_decimal()))
        .collect();
    candidate_prices.sort();
    candidate_prices.dedup();

    let mut best: Option<(Decimal, Decimal)> = None; // (price, executed_qty)
    for price in candidate_prices {
        let bid_qty: Decimal = bids_sorted
            .iter()
            .filter(|(p, _)| p.as_decimal() >= price)
            .map(|(_, q)| q.as_decimal())
            .sum();
        let ask_qty: Decimal = asks_sorted
            .iter()
            .filter(|(p, _)| p.as_decimal() <= price)
            .map(|(_, q)| q.as_decimal())
            .sum();
        let executed = bid_qty.min(ask_qty);
        if executed.is_zero() {
            continue;
        }
        match best {
            None => best = Some((price, executed)),
            Some((best_price, best_exec)) if executed > best_exec => {
                best = Some((price, executed));
                let _ = best_price;
            }
            Some((best_price, best_exec)) if executed == best_exec => {
                // Prefer the price closest to the midpoint of the two.
                let mid = (bids_sorted[0].0.as_decimal() + asks_sorted[0].0.as_decimal())
                    / Decimal::TWO;
                if (price - mid).abs() < (best_price - mid).abs() {
                    best = Some((price, best_exec));
                }
            }
            _ => {}
        }
    }

    best.map(|(price, qty)| (Price::new(price), Quantity::new(qty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pro_rata_distributes_proportionally() {
        let a = OrderId::new();
        let b = OrderId::new();
        let candidates = vec![
            ProRataCandidate {
                order_id: a,
                available: Quantity::new(dec!(60)),
            },
            ProRataCandidate {
                order_id: b,
                available: Quantity::new(dec!(40)),
            },
        ];
        let allocations = allocate_pro_rata(Quantity::new(dec!(10)), &candidates, Quantity::zero());
        assert_eq!(allocations.len(), 2);
        let a_alloc = allocations.iter().find(|(id, _)| *id == a).unwrap().1;
        let b_alloc = allocations.iter().find(|(id, _)| *id == b).unwrap().1;
        assert_eq!(a_alloc.as_decimal(), dec!(6));
        assert_eq!(b_alloc.as_decimal(), dec!(4));
    }

    #[test]
    fn pro_rata_below_floor_is_skipped() {
        let a = OrderId::new();
        let b = OrderId::new();
        let candidates = vec![
            ProRataCandidate {
                order_id: a,
                available: Quantity::new(dec!(99)),
            },
            ProRataCandidate {
                order_id: b,
                available: Quantity::new(dec!(1)),
            },
        ];
        let allocations =
            allocate_pro_rata(Quantity::new(dec!(10)), &candidates, Quantity::new(dec!(1)));
        // b's proportional share (0.1) is below the floor, so only a is allocated.
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].0, a);
    }

    #[test]
    fn clearing_price_maximizes_executed_volume() {
        let bids = vec![
            (Price::new(dec!(101)), Quantity::new(dec!(5))),
            (Price::new(dec!(100)), Quantity::new(dec!(5))),
        ];
        let asks = vec![
            (Price::new(dec!(99)), Quantity::new(dec!(5))),
            (Price::new(dec!(100)), Quantity::new(dec!(5))),
        ];
        let (price, qty) = clearing_price(&bids, &asks).unwrap();
        assert_eq!(qty.as_decimal(), dec!(10));
        assert_eq!(price.as_decimal(), dec!(100));
    }

    #[test]
    fn clearing_price_none_when_no_overlap() {
        let bids = vec![(Price::new(dec!(90)), Quantity::new(dec!(5)))];
        let asks = vec![(Price::new(dec!(100)), Quantity::new(dec!(5)))];
        assert!(clearing_price(&bids, &asks).is_none());
    }
}

//! Coarse, process-wide metrics counters.
//!
//! Replaces the "global mutable singleton metrics collector" pattern named
//! in `spec.md` §9 with an explicit, constructed [`Metrics`] handle that
//! callers create once and pass (or clone, it is `Arc`-backed internally)
//! into every subsystem, so tests can assert on a fresh instance instead of
//! reaching into process-global state. When the crate's `metrics` feature
//! is enabled, counters are additionally mirrored into the `metrics` crate
//! recorder (teacher's `Cargo.toml` already lists it as an optional dep).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    orders_submitted: AtomicU64,
    orders_rejected: AtomicU64,
    trades_emitted: AtomicU64,
    subscriber_drops: AtomicU64,
    provider_errors: AtomicU64,
    component_inits: AtomicU64,
    component_evictions: AtomicU64,
}

/// A cheap-to-clone handle to process-wide coarse counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics(Arc<Counters>);

impl Metrics {
    /// Create a fresh, zeroed metrics handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted order submission.
    pub fn record_order_submitted(&self) {
        self.0.orders_submitted.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_orders_submitted").increment(1);
    }

    /// Record a rejected order submission.
    pub fn record_order_rejected(&self) {
        self.0.orders_rejected.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_orders_rejected").increment(1);
    }

    /// Record a trade emitted by the matching engine.
    pub fn record_trade_emitted(&self) {
        self.0.trades_emitted.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_trades_emitted").increment(1);
    }

    /// Record an event dropped for a slow subscriber.
    pub fn record_subscriber_drop(&self) {
        self.0.subscriber_drops.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_subscriber_drops").increment(1);
    }

    /// Record a provider callback error.
    pub fn record_provider_error(&self) {
        self.0.provider_errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_provider_errors").increment(1);
    }

    /// Record a successful lazy component initialization.
    pub fn record_component_init(&self) {
        self.0.component_inits.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_component_inits").increment(1);
    }

    /// Record an idle-eviction of a ready component.
    pub fn record_component_eviction(&self) {
        self.0.component_evictions.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("trading_core_component_evictions").increment(1);
    }

    /// Snapshot of the current counter values, for tests and diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orders_submitted: self.0.orders_submitted.load(Ordering::Relaxed),
            orders_rejected: self.0.orders_rejected.load(Ordering::Relaxed),
            trades_emitted: self.0.trades_emitted.load(Ordering::Relaxed),
            subscriber_drops: self.0.subscriber_drops.load(Ordering::Relaxed),
            provider_errors: self.0.provider_errors.load(Ordering::Relaxed),
            component_inits: self.0.component_inits.load(Ordering::Relaxed),
            component_evictions: self.0.component_evictions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`Metrics`] counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Total accepted order submissions.
    pub orders_submitted: u64,
    /// Total rejected order submissions.
    pub orders_rejected: u64,
    /// Total trades emitted.
    pub trades_emitted: u64,
    /// Total events dropped for slow subscribers.
    pub subscriber_drops: u64,
    /// Total provider callback errors.
    pub provider_errors: u64,
    /// Total successful component initializations.
    pub component_inits: u64,
    /// Total idle component evictions.
    pub component_evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let metrics = Metrics::new();
        metrics.record_order_submitted();
        metrics.record_order_submitted();
        metrics.record_subscriber_drop();

        let snap = metrics.snapshot();
        assert_eq!(snap.orders_submitted, 2);
        assert_eq!(snap.subscriber_drops, 1);
        assert_eq!(snap.trades_emitted, 0);
    }

    #[test]
    fn clones_share_the_same_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_trade_emitted();
        assert_eq!(metrics.snapshot().trades_emitted, 1);
    }
}

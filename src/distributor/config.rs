//! Distributor configuration, in the style of
//! `usealtoal-edgelord`'s `ResourceBudget` (const constructors, named
//! presets). Every knob in `spec.md` §6's "subscriber-outbound-buffer-size,
//! cache-default-TTL, cache-freshness-window" line item lives here.

use crate::distributor::subscription::DEFAULT_OUTBOUND_BUFFER_SIZE;

/// Distributor-wide tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributorConfig {
    /// Bound of each subscription's outbound channel.
    pub subscriber_outbound_buffer_size: usize,
    /// Default cache TTL, in milliseconds, used when a data type has no
    /// more specific override.
    pub cache_default_ttl_millis: u64,
    /// `GetSnapshot` fails with `stale` once a cached value exceeds this
    /// age, in milliseconds.
    pub cache_freshness_window_millis: u64,
    /// Timeout for a synchronous provider pull on cache miss, in
    /// milliseconds.
    pub provider_pull_timeout_millis: u64,
}

impl DistributorConfig {
    /// Construct a config from explicit values.
    #[must_use]
    pub const fn new(
        subscriber_outbound_buffer_size: usize,
        cache_default_ttl_millis: u64,
        cache_freshness_window_millis: u64,
        provider_pull_timeout_millis: u64,
    ) -> Self {
        Self {
            subscriber_outbound_buffer_size,
            cache_default_ttl_millis,
            cache_freshness_window_millis,
            provider_pull_timeout_millis,
        }
    }

    /// Defaults suited to local development and tests: small buffers,
    /// short windows, fast failure.
    #[must_use]
    pub const fn local() -> Self {
        Self::new(DEFAULT_OUTBOUND_BUFFER_SIZE, 1_000, 5_000, 500)
    }

    /// Defaults suited to production: larger buffers to absorb bursts,
    /// a cache freshness window generous enough to survive a brief
    /// provider hiccup.
    #[must_use]
    pub const fn production() -> Self {
        Self::new(2_048, 5_000, 30_000, 2_000)
    }
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self::local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_buffers_are_larger_than_local() {
        assert!(DistributorConfig::production().subscriber_outbound_buffer_size
            > DistributorConfig::local().subscriber_outbound_buffer_size);
    }
}

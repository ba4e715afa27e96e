//! Per-(symbol, data-type) latest-value cache with TTL and a freshness
//! window (`spec.md` §4.2 "Caching").

use crate::distributor::event::EventPayload;
use crate::distributor::subscription::DataType;
use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct CacheEntry {
    value: EventPayload,
    updated_at: u64,
}

/// Outcome of a [`SnapshotCache::get`] call.
pub enum CacheLookup {
    /// A fresh cached value.
    Fresh(EventPayload),
    /// A cached value exists but is older than the freshness window.
    Stale {
        /// The stale payload, in case the caller wants to serve it anyway
        /// while a refresh is attempted.
        value: EventPayload,
        /// Age of the value, in milliseconds.
        age_millis: u64,
    },
    /// No value has ever been cached for this key.
    Miss,
}

/// Concurrent `(symbol, data-type) -> (value, last-update)` cache.
#[derive(Default)]
pub struct SnapshotCache {
    entries: DashMap<(String, DataType), CacheEntry>,
    freshness_window_millis: u64,
}

impl SnapshotCache {
    /// Create a cache with the given freshness window.
    #[must_use]
    pub fn new(freshness_window_millis: u64) -> Self {
        Self {
            entries: DashMap::new(),
            freshness_window_millis,
        }
    }

    /// Store the latest value for `(symbol, data_type)`, stamped with the
    /// current time.
    pub fn put(&self, symbol: &str, data_type: DataType, value: EventPayload) {
        self.entries.insert(
            (symbol.to_string(), data_type),
            CacheEntry {
                value,
                updated_at: now_millis(),
            },
        );
    }

    /// Look up the cached value for `(symbol, data_type)`.
    #[must_use]
    pub fn get(&self, symbol: &str, data_type: DataType) -> CacheLookup {
        let Some(entry) = self.entries.get(&(symbol.to_string(), data_type)) else {
            return CacheLookup::Miss;
        };
        let age = now_millis().saturating_sub(entry.updated_at);
        if age > self.freshness_window_millis {
            CacheLookup::Stale {
                value: entry.value.clone(),
                age_millis: age,
            }
        } else {
            CacheLookup::Fresh(entry.value.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_unknown_key() {
        let cache = SnapshotCache::new(60_000);
        assert!(matches!(
            cache.get("BTC-USD", DataType::Ticker),
            CacheLookup::Miss
        ));
    }

    #[test]
    fn fresh_value_is_returned_within_window() {
        let cache = SnapshotCache::new(60_000);
        cache.put(
            "BTC-USD",
            DataType::Ticker,
            EventPayload::ProviderDegraded {
                reason: "unused".into(),
            },
        );
        assert!(matches!(
            cache.get("BTC-USD", DataType::Ticker),
            CacheLookup::Fresh(_)
        ));
    }

    #[test]
    fn value_older_than_window_reports_stale() {
        let cache = SnapshotCache::new(0);
        cache.put(
            "BTC-USD",
            DataType::Ticker,
            EventPayload::ProviderDegraded {
                reason: "unused".into(),
            },
        );
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(matches!(
            cache.get("BTC-USD", DataType::Ticker),
            CacheLookup::Stale { .. }
        ));
    }
}

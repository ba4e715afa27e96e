//! Opaque identifiers used across the engine, distributor, and supervisor.
//!
//! Replaces the teacher's `pricelevel::Id`/`Hash32` with crate-owned
//! newtypes over [`uuid::Uuid`], since this crate's `Order`/`Trade` shapes
//! diverge from `pricelevel`'s (see `DESIGN.md`).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. recovered from a journal or wire message).
            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(OrderId, "Opaque, globally unique order identifier.");
uuid_id!(TradeId, "Opaque, globally unique trade identifier.");
uuid_id!(
    SubscriptionId,
    "Opaque, globally unique market-data subscription identifier."
);
uuid_id!(
    CorrelationId,
    "Request-scoped correlation identifier propagated through logs and events."
);

/// Monotonic per-key sequence number generator.
///
/// Used for per-(symbol) trade sequencing and per-(symbol, data-type)
/// event sequencing. A single `SequenceCounter` must be owned by the one
/// writer responsible for a given key, matching the "conceptually a single
/// writer per symbol" ordering guarantee.
#[derive(Debug, Default)]
pub struct SequenceCounter(std::sync::atomic::AtomicU64);

impl SequenceCounter {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self(std::sync::atomic::AtomicU64::new(0))
    }

    /// Returns the next sequence number, starting from 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
    }

    /// Returns the most recently issued sequence number (0 if none issued).
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn sequence_counter_is_strictly_increasing_and_gapless() {
        let counter = SequenceCounter::new();
        let seqs: Vec<u64> = (0..5).map(|_| counter.next()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(counter.current(), 5);
    }
}

//! Normalized market event envelope, `spec.md` §6 "Produced to subscribers".

use crate::distributor::ohlcv::OhlcvBucket;
use crate::distributor::subscription::DataType;
use crate::distributor::ticker::TickerState;
use crate::engine::book::BookSnapshot;
use crate::engine::trade::Trade;
use serde::{Deserialize, Serialize};

/// The payload carried by an [`EventEnvelope`]; variants mirror the Data
/// Model structs from `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Top-N order-book levels.
    OrderBook(BookSnapshot),
    /// A single trade.
    Trade(Trade),
    /// Rolling ticker state.
    Ticker(TickerState),
    /// An immutable, closed OHLCV bucket.
    Ohlcv(OhlcvBucket),
    /// Synthetic status event emitted when a provider is marked degraded
    /// (`spec.md` §4.2 "Failure semantics").
    ProviderDegraded {
        /// Human-readable reason.
        reason: String,
    },
}

impl EventPayload {
    /// The [`DataType`] this payload corresponds to, where applicable.
    /// `ProviderDegraded` has no single data type — it fans out to every
    /// subscription for the affected symbol regardless of data type.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            EventPayload::OrderBook(_) => Some(DataType::OrderBook),
            EventPayload::Trade(_) => Some(DataType::Trade),
            EventPayload::Ticker(_) => Some(DataType::Ticker),
            EventPayload::Ohlcv(_) => Some(DataType::Ohlcv),
            EventPayload::ProviderDegraded { .. } => None,
        }
    }
}

/// A sequenced, timestamped event delivered to subscribers.
///
/// `sequence` is per `(symbol, data-type)`, strictly increasing, and MUST
/// NOT gap except after an explicit resync (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Trading symbol this event concerns.
    pub symbol: String,
    /// Per-(symbol, data-type) strictly increasing sequence number.
    pub sequence: u64,
    /// Commit/ingest timestamp, milliseconds since epoch.
    pub timestamp: u64,
    /// The event payload.
    pub payload: EventPayload,
}

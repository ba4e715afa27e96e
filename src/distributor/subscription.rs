//! Subscription handles and bounded, drop-newest delivery channels
//! (`spec.md` §3 "Subscription", §4.2 "Ordering & delivery").

use crate::common::{Metrics, SubscriptionId};
use crate::distributor::event::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Market-data kinds a subscriber can request, `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Top-N order-book levels.
    OrderBook,
    /// Individual trades.
    Trade,
    /// Rolling ticker.
    Ticker,
    /// OHLCV candles at a configured interval.
    Ohlcv,
}

/// OHLCV candle interval. Irrelevant for non-OHLCV subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// One-second buckets.
    OneSecond,
    /// One-minute buckets.
    OneMinute,
    /// One-hour buckets.
    OneHour,
    /// One-day buckets.
    OneDay,
}

impl Interval {
    /// Bucket width in milliseconds.
    #[must_use]
    pub fn millis(self) -> u64 {
        match self {
            Interval::OneSecond => 1_000,
            Interval::OneMinute => 60_000,
            Interval::OneHour => 3_600_000,
            Interval::OneDay => 86_400_000,
        }
    }
}

/// The (symbol, data-type[, interval]) key a subscription is registered
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Trading symbol.
    pub symbol: String,
    /// Requested data type.
    pub data_type: DataType,
    /// Candle interval; required (and only meaningful) for `DataType::Ohlcv`.
    pub interval: Option<Interval>,
}

impl SubscriptionKey {
    /// Construct a key, validating that an interval is present iff the
    /// data type is OHLCV.
    pub fn new(symbol: impl Into<String>, data_type: DataType, interval: Option<Interval>) -> Result<Self, String> {
        match (data_type, interval) {
            (DataType::Ohlcv, None) => Err("OHLCV subscriptions require an interval".to_string()),
            (dt, Some(_)) if dt != DataType::Ohlcv => {
                Err("interval is only meaningful for OHLCV subscriptions".to_string())
            }
            _ => Ok(Self {
                symbol: symbol.into(),
                data_type,
                interval,
            }),
        }
    }
}

/// Default bound of a subscriber's outbound buffer, `spec.md` §6.
pub const DEFAULT_OUTBOUND_BUFFER_SIZE: usize = 256;

/// A live subscription: its key, the receiving half of its bounded
/// channel, and its own drop counter.
pub struct Subscription {
    id: SubscriptionId,
    key: SubscriptionKey,
    receiver: mpsc::Receiver<EventEnvelope>,
}

impl Subscription {
    /// This subscription's opaque id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The key this subscription was registered under.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Receive the next event, or `None` once the distributor has dropped
    /// the sending half (e.g. on shutdown or explicit unsubscribe).
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, for tests and polling integrations.
    pub fn try_recv(&mut self) -> Result<EventEnvelope, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// The distributor-owned sending half of a subscription's channel, plus
/// bookkeeping for drop-newest backpressure (`spec.md` §4.2, §9 "Callback-
/// based subscriber model" redesign flag).
pub struct SubscriptionSink {
    id: SubscriptionId,
    key: SubscriptionKey,
    sender: mpsc::Sender<EventEnvelope>,
    metrics: Metrics,
}

impl SubscriptionSink {
    /// Create a new bounded channel for `key` and return the `(sink,
    /// subscription)` pair.
    #[must_use]
    pub fn new(key: SubscriptionKey, buffer_size: usize, metrics: Metrics) -> (Self, Subscription) {
        let id = SubscriptionId::new();
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let sink = Self {
            id,
            key: key.clone(),
            sender,
            metrics,
        };
        let subscription = Subscription { id, key, receiver };
        (sink, subscription)
    }

    /// This subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The key this sink delivers events for.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Attempt to deliver `event`. On a full buffer the event is dropped
    /// for this subscriber only and the drop counter is incremented; the
    /// distributor's ingest path never blocks on a slow consumer.
    pub fn try_deliver(&self, event: EventEnvelope) {
        if self.sender.try_send(event).is_err() {
            self.metrics.record_subscriber_drop();
        }
    }

    /// `true` once every corresponding `Subscription` has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributor::event::EventPayload;

    fn envelope(seq: u64) -> EventEnvelope {
        EventEnvelope {
            symbol: "BTC-USD".into(),
            sequence: seq,
            timestamp: 0,
            payload: EventPayload::ProviderDegraded {
                reason: "test".into(),
            },
        }
    }

    #[test]
    fn ohlcv_key_requires_interval() {
        assert!(SubscriptionKey::new("BTC-USD", DataType::Ohlcv, None).is_err());
        assert!(SubscriptionKey::new("BTC-USD", DataType::Ohlcv, Some(Interval::OneMinute)).is_ok());
    }

    #[test]
    fn non_ohlcv_key_rejects_interval() {
        assert!(SubscriptionKey::new("BTC-USD", DataType::Trade, Some(Interval::OneMinute)).is_err());
    }

    #[tokio::test]
    async fn full_buffer_drops_newest_and_counts_it() {
        let key = SubscriptionKey::new("BTC-USD", DataType::Trade, None).unwrap();
        let metrics = Metrics::new();
        let (sink, mut sub) = SubscriptionSink::new(key, 1, metrics.clone());

        sink.try_deliver(envelope(1));
        sink.try_deliver(envelope(2)); // dropped: buffer full
        sink.try_deliver(envelope(3)); // still dropped until a read frees a slot

        let first = sub.recv().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(metrics.snapshot().subscriber_drops, 2);

        sink.try_deliver(envelope(4));
        let next = sub.recv().await.unwrap();
        assert_eq!(next.sequence, 4);
    }
}

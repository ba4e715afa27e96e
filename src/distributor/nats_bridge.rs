//! Optional NATS JetStream trade-event bridge, `feature = "nats"`.
//!
//! One concrete external publishing sink among several the distributor can
//! be wired to; it is not the distributor's primary subscriber interface
//! (that is the in-process channel model in `distributor::subscription`).
//! Generalized from the teacher's `orderbook::nats::NatsTradePublisher`,
//! which published directly from a `TradeListener` callback — here it
//! subscribes to [`crate::engine::MatchingEngine`]'s broadcast trade stream
//! instead, keeping the same two-subject fan-out and retry/backoff shape.

use crate::engine::trade::Trade;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, trace, warn};

const DEFAULT_MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 10;

/// Publishes trades received on a `broadcast::Receiver<Trade>` to NATS
/// JetStream, on subjects `{prefix}.{symbol}` and `{prefix}.all`.
pub struct NatsTradeBridge {
    jetstream: async_nats::jetstream::Context,
    subject_prefix: String,
    sequence: AtomicU64,
    publish_count: AtomicU64,
    error_count: AtomicU64,
    max_retries: u32,
}

impl NatsTradeBridge {
    /// Create a new bridge over an existing JetStream context.
    #[must_use]
    pub fn new(jetstream: async_nats::jetstream::Context, subject_prefix: String) -> Self {
        Self {
            jetstream,
            subject_prefix,
            sequence: AtomicU64::new(0),
            publish_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the retry budget for transient publish failures.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Total successfully published messages (across both subjects).
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    /// Total permanently failed publish attempts.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Drive the bridge: consume `rx` until the channel closes, publishing
    /// each trade. Intended to be spawned as its own task; never called
    /// from the matching engine's hot path.
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<Trade>) {
        loop {
            match rx.recv().await {
                Ok(trade) => self.publish(&trade).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "nats bridge lagged behind trade stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn publish(&self, trade: &Trade) {
        let Ok(body) = serde_json::to_vec(trade) else {
            error!(trade_id = %trade.id, "failed to serialize trade for nats publish");
            self.error_count.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        for subject in [
            format!("{}.{}", self.subject_prefix, trade.symbol),
            format!("{}.all", self.subject_prefix),
        ] {
            self.publish_with_retry(&subject, &body, seq).await;
        }
    }

    async fn publish_with_retry(&self, subject: &str, body: &[u8], seq: u64) {
        let mut attempt = 0;
        loop {
            match self.jetstream.publish(subject.to_string(), body.to_vec().into()).await {
                Ok(_) => {
                    self.publish_count.fetch_add(1, Ordering::Relaxed);
                    trace!(subject, seq, "published trade to nats");
                    return;
                }
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
                    warn!(subject, attempt, %err, "nats publish failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => {
                    error!(subject, %err, "nats publish failed permanently");
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

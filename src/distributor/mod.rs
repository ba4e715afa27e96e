//! Market-data distributor: fan-out of order-book snapshots, trades,
//! tickers, and OHLCV candles to subscribers, plus external-feed bridging
//! (`spec.md` §4.2).

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
#[cfg(feature = "nats")]
pub mod nats_bridge;
pub mod ohlcv;
pub mod provider;
pub mod subscription;
pub mod ticker;

pub use cache::{CacheLookup, SnapshotCache};
pub use config::DistributorConfig;
pub use error::DistributorError;
pub use event::{EventEnvelope, EventPayload};
pub use ohlcv::{OhlcvBucket, OhlcvTracker};
pub use provider::{Provider, ProviderCallback, ProviderError};
pub use subscription::{DataType, Interval, Subscription, SubscriptionKey, SubscriptionSink};
pub use ticker::{TickerState, TickerTracker};

use crate::common::{ids::SequenceCounter, Metrics};
use crate::engine::trade::Trade;
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct SymbolDerivation {
    ticker: Mutex<TickerTracker>,
    ohlcv: DashMap<Interval, Mutex<OhlcvTracker>>,
}

/// The distributor: owns subscriptions, a snapshot cache, per-symbol
/// ticker/OHLCV derivation state, and an optional set of external feed
/// providers.
pub struct MarketDataDistributor {
    config: DistributorConfig,
    known_symbols: DashSet<String>,
    subscriptions: DashMap<SubscriptionKey, Vec<SubscriptionSink>>,
    sequences: DashMap<(String, DataType), SequenceCounter>,
    cache: SnapshotCache,
    derivation: DashMap<String, SymbolDerivation>,
    providers: DashMap<String, Arc<dyn Provider>>,
    metrics: Metrics,
}

impl MarketDataDistributor {
    /// Create a distributor with the given configuration and metrics
    /// handle.
    #[must_use]
    pub fn new(config: DistributorConfig, metrics: Metrics) -> Self {
        Self {
            cache: SnapshotCache::new(config.cache_freshness_window_millis),
            config,
            known_symbols: DashSet::new(),
            subscriptions: DashMap::new(),
            sequences: DashMap::new(),
            derivation: DashMap::new(),
            providers: DashMap::new(),
            metrics,
        }
    }

    /// Register a symbol as known to this distributor. Subscriptions and
    /// `GetSnapshot` calls for unregistered symbols fail with
    /// `UnknownSymbol`.
    pub fn register_symbol(&self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        self.known_symbols.insert(symbol.clone());
        self.derivation.entry(symbol).or_insert_with(|| SymbolDerivation {
            ticker: Mutex::new(TickerTracker::new()),
            ohlcv: DashMap::new(),
        });
    }

    /// Register an external feed provider, keyed by its name, for cache-
    /// miss pulls (`spec.md` §4.2 "Caching").
    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Subscribe to `(symbol, data_type[, interval])`. Always yields a
    /// fresh subscription with a new id, even if an identical key already
    /// has subscribers (`spec.md` §8 "Subscribe → Unsubscribe → Subscribe
    /// yields a fresh subscription").
    pub fn subscribe(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
    ) -> Result<Subscription, DistributorError> {
        if !self.known_symbols.contains(symbol) {
            return Err(DistributorError::UnknownSymbol(symbol.to_string()));
        }
        let key = SubscriptionKey::new(symbol, data_type, interval)
            .map_err(DistributorError::BadSubscriptionKey)?;

        let (sink, subscription) =
            SubscriptionSink::new(key.clone(), self.config.subscriber_outbound_buffer_size, self.metrics.clone());
        self.subscriptions.entry(key).or_default().push(sink);
        Ok(subscription)
    }

    /// Unsubscribe, idempotently. Dropping every handle returned by
    /// [`subscribe`](Self::subscribe) for a key also frees the channel;
    /// this additionally prunes the now-closed sink eagerly, and once the
    /// local subscriber count for `(symbol, data_type[, interval])` reaches
    /// zero, deregisters the upstream subscription against every
    /// registered provider (each provider tracks its own refcount and only
    /// tears down the real upstream stream when it also reaches zero, same
    /// as `feed::WsFeedAdapter`).
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let key = subscription.key().clone();
        drop(subscription);
        let remaining = match self.subscriptions.get_mut(&key) {
            Some(mut sinks) => {
                sinks.retain(|s| !s.is_closed());
                sinks.len()
            }
            None => 0,
        };
        if remaining > 0 {
            return;
        }
        self.subscriptions.remove(&key);
        let providers: Vec<Arc<dyn Provider>> = self.providers.iter().map(|e| e.value().clone()).collect();
        for provider in providers {
            if let Err(error) = provider.unsubscribe(&key.symbol, key.data_type, key.interval).await {
                warn!(provider = provider.name(), symbol = %key.symbol, %error, "upstream unsubscribe failed");
            }
        }
    }

    /// Current cached value for `(symbol, data_type)`.
    pub async fn get_snapshot(
        &self,
        symbol: &str,
        data_type: DataType,
    ) -> Result<EventPayload, DistributorError> {
        if !self.known_symbols.contains(symbol) {
            return Err(DistributorError::UnknownSymbol(symbol.to_string()));
        }
        match self.cache.get(symbol, data_type) {
            CacheLookup::Fresh(value) => Ok(value),
            CacheLookup::Stale { age_millis, .. } => Err(DistributorError::Stale { age_millis }),
            CacheLookup::Miss => self.pull_from_provider(symbol, data_type).await,
        }
    }

    async fn pull_from_provider(
        &self,
        symbol: &str,
        data_type: DataType,
    ) -> Result<EventPayload, DistributorError> {
        let Some(provider) = self.providers.iter().next().map(|e| e.value().clone()) else {
            return Err(DistributorError::ProviderTimeout);
        };
        let pull = provider.get(symbol, data_type, None);
        match timeout(Duration::from_millis(self.config.provider_pull_timeout_millis), pull).await {
            Ok(Ok(payload)) => {
                self.cache.put(symbol, data_type, payload.clone());
                Ok(payload)
            }
            Ok(Err(err)) => {
                self.metrics.record_provider_error();
                Err(DistributorError::ProviderError(err.to_string()))
            }
            Err(_) => Err(DistributorError::ProviderTimeout),
        }
    }

    /// Deliver `payload` to every current subscriber of `(symbol,
    /// data_type)`, update the cache, and assign the next per-key sequence
    /// number (internal ingress path, `spec.md` §4.2 "Ingest").
    pub fn ingest(&self, symbol: &str, data_type: DataType, payload: EventPayload) {
        self.cache.put(symbol, data_type, payload.clone());
        let key = (symbol.to_string(), data_type);
        let sequence = self.sequences.entry(key).or_default().next();
        let envelope = EventEnvelope {
            symbol: symbol.to_string(),
            sequence,
            timestamp: now_millis(),
            payload,
        };
        self.deliver(symbol, data_type, None, envelope);
    }

    fn deliver(&self, symbol: &str, data_type: DataType, interval: Option<Interval>, envelope: EventEnvelope) {
        let Ok(key) = SubscriptionKey::new(symbol, data_type, interval) else {
            return;
        };
        if let Some(sinks) = self.subscriptions.get(&key) {
            for sink in sinks.iter() {
                sink.try_deliver(envelope.clone());
            }
        }
    }

    /// Fold a trade from the matching engine's trade stream into this
    /// symbol's derived ticker and OHLCV state, emitting a `Trade` event
    /// plus any derived `Ticker`/`Ohlcv` events to their respective
    /// subscribers (`spec.md` §4.2 "Ticker/OHLCV derivation").
    ///
    /// `intervals` lists which OHLCV intervals to maintain for this
    /// symbol; an empty slice derives ticker only.
    pub fn ingest_trade(&self, trade: &Trade, intervals: &[Interval]) {
        self.ingest(&trade.symbol, DataType::Trade, EventPayload::Trade(trade.clone()));

        let Some(derivation) = self.derivation.get(&trade.symbol) else {
            warn!(symbol = %trade.symbol, "trade ingested for unregistered symbol, skipping derivation");
            return;
        };

        let ticker = {
            let mut tracker = derivation.ticker.lock().unwrap();
            tracker.update(&trade.symbol, trade)
        };
        self.ingest(&trade.symbol, DataType::Ticker, EventPayload::Ticker(ticker));

        for &interval in intervals {
            let mut entry = derivation
                .ohlcv
                .entry(interval)
                .or_insert_with(|| Mutex::new(OhlcvTracker::new(trade.symbol.clone(), interval)));
            let closed = entry.get_mut().unwrap().ingest(trade);
            if let Some(bucket) = closed {
                debug!(symbol = %trade.symbol, ?interval, "ohlcv bucket closed");
                self.ingest(&trade.symbol, DataType::Ohlcv, EventPayload::Ohlcv(bucket));
            }
        }
    }

    /// Mark a provider degraded and fan a synthetic status event out to
    /// every subscription for every symbol it served (`spec.md` §4.2
    /// "persistent error rate ... propagates a synthetic status event").
    pub fn mark_provider_degraded(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let symbols: Vec<String> = self.known_symbols.iter().map(|s| s.clone()).collect();
        for symbol in symbols {
            for data_type in [DataType::OrderBook, DataType::Trade, DataType::Ticker, DataType::Ohlcv] {
                self.ingest(
                    &symbol,
                    data_type,
                    EventPayload::ProviderDegraded {
                        reason: reason.clone(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{OrderId, TradeId};
    use crate::engine::order::Side;
    use crate::common::Price;
    use crate::common::Quantity;
    use rust_decimal_macros::dec;

    fn trade(symbol: &str, price: Decimal, qty: Decimal) -> Trade {
        Trade {
            id: TradeId::new(),
            symbol: symbol.to_string(),
            price: Price::new(price),
            quantity: Quantity::new(qty),
            taker_side: Side::Buy,
            maker_order_id: OrderId::new(),
            taker_order_id: OrderId::new(),
            timestamp: now_millis(),
            sequence: 1,
        }
    }

    use rust_decimal::Decimal;

    #[tokio::test]
    async fn subscribe_to_unknown_symbol_fails() {
        let dist = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
        let err = dist.subscribe("BTC-USD", DataType::Trade, None).unwrap_err();
        assert!(matches!(err, DistributorError::UnknownSymbol(_)));
    }

    #[tokio::test]
    async fn subscribed_trade_is_delivered_and_cached() {
        let dist = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
        dist.register_symbol("BTC-USD");
        let mut sub = dist.subscribe("BTC-USD", DataType::Trade, None).unwrap();

        dist.ingest_trade(&trade("BTC-USD", dec!(100), dec!(1)), &[]);

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.sequence, 1);
        assert!(matches!(envelope.payload, EventPayload::Trade(_)));

        let cached = dist.get_snapshot("BTC-USD", DataType::Trade).await.unwrap();
        assert!(matches!(cached, EventPayload::Trade(_)));
    }

    #[tokio::test]
    async fn ticker_and_ohlcv_are_derived_from_trades() {
        let dist = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
        dist.register_symbol("BTC-USD");
        let mut ticker_sub = dist.subscribe("BTC-USD", DataType::Ticker, None).unwrap();

        dist.ingest_trade(&trade("BTC-USD", dec!(100), dec!(1)), &[Interval::OneMinute]);

        let envelope = ticker_sub.recv().await.unwrap();
        assert!(matches!(envelope.payload, EventPayload::Ticker(_)));
    }

    #[tokio::test]
    async fn resubscribe_yields_fresh_subscription_with_new_id() {
        let dist = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
        dist.register_symbol("BTC-USD");
        let first = dist.subscribe("BTC-USD", DataType::Trade, None).unwrap();
        let first_id = first.id();
        dist.unsubscribe(first).await;
        let second = dist.subscribe("BTC-USD", DataType::Trade, None).unwrap();
        assert_ne!(first_id, second.id());
    }

    #[tokio::test]
    async fn snapshot_miss_with_no_provider_times_out() {
        let dist = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
        dist.register_symbol("BTC-USD");
        let err = dist.get_snapshot("BTC-USD", DataType::Ticker).await.unwrap_err();
        assert!(matches!(err, DistributorError::ProviderTimeout));
    }

    struct CountingUnsubscribeProvider {
        unsubscribe_calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Provider for CountingUnsubscribeProvider {
        async fn connect(&self) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn subscribe(
            &self,
            _symbol: &str,
            _data_type: DataType,
            _interval: Option<Interval>,
            _callback: Arc<dyn crate::distributor::provider::ProviderCallback>,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn unsubscribe(&self, _symbol: &str, _data_type: DataType, _interval: Option<Interval>) -> Result<(), ProviderError> {
            self.unsubscribe_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn get(&self, _symbol: &str, _data_type: DataType, _interval: Option<Interval>) -> Result<EventPayload, ProviderError> {
            Err(ProviderError("unused".to_string()))
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn upstream_unsubscribe_only_fires_once_the_local_refcount_hits_zero() {
        let dist = MarketDataDistributor::new(DistributorConfig::local(), Metrics::new());
        dist.register_symbol("BTC-USD");
        let unsubscribe_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        dist.register_provider(Arc::new(CountingUnsubscribeProvider {
            unsubscribe_calls: unsubscribe_calls.clone(),
        }));

        let first = dist.subscribe("BTC-USD", DataType::Trade, None).unwrap();
        let second = dist.subscribe("BTC-USD", DataType::Trade, None).unwrap();

        dist.unsubscribe(first).await;
        assert_eq!(unsubscribe_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        dist.unsubscribe(second).await;
        assert_eq!(unsubscribe_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}

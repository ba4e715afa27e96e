//! Convenience re-exports of the most commonly used types.
//!
//! ```rust
//! use trading_core::prelude::*;
//! ```

// Common substrate
pub use crate::common::{CorrelationId, CoreError, ErrorKind, OrderId, Price, Quantity, SubscriptionId, TradeId};
pub use crate::common::metrics::Metrics;

// Matching engine
pub use crate::engine::{
    Algorithm, BookSnapshot, CancelOutcome, EngineError, IcebergState, LevelAgg, MatchingEngine,
    ModifyOutcome, Order, OrderBook, OrderKind, OrderStatus, RiskGate, RiskVerdict, STPMode,
    SelfCrossPolicy, Side, SubmitOutcome, SymbolConfig, TimeInForce, Trade,
};
pub use crate::engine::risk::AllowAll;

// Market-data distributor
pub use crate::distributor::{
    CacheLookup, DataType, DistributorConfig, DistributorError, EventEnvelope, EventPayload,
    Interval, MarketDataDistributor, OhlcvBucket, OhlcvTracker, Provider, ProviderCallback,
    ProviderError, SnapshotCache, Subscription, SubscriptionKey, SubscriptionSink, TickerState,
    TickerTracker,
};
#[cfg(feature = "nats")]
pub use crate::distributor::nats_bridge::NatsTradeBridge;

// Lazy component supervisor
pub use crate::supervisor::{
    CleanupFn, ComponentHandle, ComponentSpec, ComponentState, ContextPropagator, Instance,
    MemoryBudget, ProviderFn, Scope, Supervisor, SupervisorConfig, SupervisorError,
};

// Reference feed adapter
pub use crate::feed::{Backoff, OutboundFrame, RawFeedMessage, RawLevel, RawSide, ReconnectConfig, WsFeedAdapter};

//! Uniform external-feed provider capability set (`spec.md` §4.2 "External
//! feed bridging", §6 "Provider interface").
//!
//! Concrete providers (e.g. `crate::feed::WebSocketFeedAdapter`) implement
//! this trait; the distributor holds them as `Arc<dyn Provider>` and never
//! assumes anything about the thread a callback runs on.

use crate::distributor::event::EventPayload;
use crate::distributor::subscription::{DataType, Interval};
use async_trait::async_trait;
use std::fmt;

/// A provider-side error, surfaced through [`ProviderCallback`] or a
/// synchronous `get` call.
#[derive(Debug, Clone)]
pub struct ProviderError(pub String);

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error: {}", self.0)
    }
}

impl std::error::Error for ProviderError {}

/// Invoked on a provider-private task/thread whenever a subscribed event
/// arrives. Implementations must never block: the distributor treats every
/// provider as an asynchronous producer and never holds its own locks
/// while running this path (`spec.md` §4.2).
pub trait ProviderCallback: Send + Sync {
    /// Handle one normalized event for `symbol`.
    fn on_event(&self, symbol: &str, data_type: DataType, payload: EventPayload);
}

impl<F> ProviderCallback for F
where
    F: Fn(&str, DataType, EventPayload) + Send + Sync,
{
    fn on_event(&self, symbol: &str, data_type: DataType, payload: EventPayload) {
        (self)(symbol, data_type, payload)
    }
}

/// Connect / Disconnect / per-data-type Subscribe / Unsubscribe / Get,
/// `spec.md` §4.2.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Establish the underlying transport connection.
    async fn connect(&self) -> Result<(), ProviderError>;

    /// Tear down the underlying transport connection.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Subscribe to `(symbol, data_type[, interval])`, registering
    /// `callback` to receive normalized events. Reference-counted: a
    /// second subscribe for the same key increments a refcount rather
    /// than opening a second upstream stream.
    async fn subscribe(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
        callback: std::sync::Arc<dyn ProviderCallback>,
    ) -> Result<(), ProviderError>;

    /// Unsubscribe from `(symbol, data_type[, interval])`. Deregisters the
    /// upstream subscription only once the refcount reaches zero.
    async fn unsubscribe(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
    ) -> Result<(), ProviderError>;

    /// Synchronous request-response pull, used by the distributor on a
    /// cache miss with no active feed.
    async fn get(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
    ) -> Result<EventPayload, ProviderError>;

    /// Human-readable provider name, used in degraded-status events.
    fn name(&self) -> &str;
}

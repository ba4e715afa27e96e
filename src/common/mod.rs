//! Cross-cutting substrate shared by the engine, distributor, supervisor and
//! feed modules: the error taxonomy, opaque identifiers, exact-decimal price
//! and quantity types, object pools, and coarse metrics counters.

pub mod error;
pub mod ids;
pub mod metrics;
pub mod pool;
pub mod price;

pub use error::{CoreError, ErrorKind};
pub use ids::{CorrelationId, OrderId, SubscriptionId, TradeId};
pub use price::{Price, Quantity};

//! Reference external feed adapter (`spec.md` §4.4): a JSON-over-WebSocket
//! + HTTP `Provider` implementation. The teacher has no networking layer
//! of its own; this module is grounded on `usealtoal-edgelord`'s exchange
//! adapters and `hot3246624-pm_as_ofi`'s message normalization.

pub mod messages;
pub mod reconnect;
pub mod ws_adapter;

pub use messages::{OutboundFrame, RawFeedMessage, RawLevel, RawSide};
pub use reconnect::{Backoff, ReconnectConfig};
pub use ws_adapter::WsFeedAdapter;

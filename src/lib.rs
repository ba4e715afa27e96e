//! # trading-core
//!
//! A real-time trading platform core: a matching engine, a market-data
//! distributor, a lazy component supervisor for expensive shared resources,
//! and a reference external feed adapter.
//!
//! ## Modules
//!
//! - [`common`] — cross-cutting substrate: error taxonomy, opaque ids,
//!   decimal price/quantity types, object pools, metrics.
//! - [`engine`] — the matching engine: order books, matching algorithms,
//!   self-trade prevention, risk gating.
//! - [`distributor`] — market-data fan-out: subscriptions, snapshot caching,
//!   ticker/OHLCV derivation, external feed bridging.
//! - [`supervisor`] — lazy, memory-budgeted initialization and lifecycle
//!   management for expensive shared components.
//! - [`feed`] — a reference `Provider` implementation over WebSocket + HTTP.
//!
//! See `DESIGN.md` for how each module maps onto its ancestor and the rest
//! of the reference pack it was built from.

pub mod common;
pub mod distributor;
pub mod engine;
pub mod feed;
pub mod prelude;
pub mod supervisor;

//! Matching engine: per-symbol order books, pluggable matching algorithms,
//! self-trade prevention, and a multi-symbol manager (`spec.md` §4.1).

pub mod algorithm;
pub mod book;
pub mod error;
pub mod manager;
pub mod order;
pub mod price_level;
pub mod risk;
pub mod stp;
pub mod trade;

pub use algorithm::Algorithm;
pub use book::{BookSnapshot, CancelOutcome, LevelAgg, ModifyOutcome, OrderBook, SubmitOutcome};
pub use error::EngineError;
pub use manager::{MatchingEngine, SymbolConfig};
pub use order::{IcebergState, Order, OrderKind, OrderStatus, Side, TimeInForce};
pub use risk::{AllowAll, RiskGate, RiskVerdict};
pub use stp::{STPMode, SelfCrossPolicy};
pub use trade::Trade;

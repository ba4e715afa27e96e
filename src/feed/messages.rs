//! Normalized wire messages for the reference feed adapter (`spec.md` §4.4
//! "Parsing"). Raw provider JSON is decoded into these structs before being
//! handed to [`crate::distributor::event::EventPayload`]; styled on
//! `hot3246624-pm_as_ofi/src/polymarket/messages.rs`'s normalized-message
//! enum, adapted from that project's WebSocket taps to this crate's
//! `Price`/`Quantity` decimal boundary.

use crate::engine::order::Side;
use serde::{Deserialize, Serialize};

/// One decoded frame from the upstream WebSocket stream, demultiplexed by
/// stream suffix and normalized. Timestamps are provider epoch-milliseconds,
/// converted to the common convention by the caller (`spec.md` §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawFeedMessage {
    /// A top-of-book or top-N depth update for one symbol.
    BookUpdate {
        symbol: String,
        bids: Vec<RawLevel>,
        asks: Vec<RawLevel>,
        #[serde(rename = "ts")]
        timestamp_millis: u64,
    },
    /// A single executed trade.
    Trade {
        symbol: String,
        price: String,
        size: String,
        taker_side: RawSide,
        #[serde(rename = "ts")]
        timestamp_millis: u64,
    },
    /// Acknowledgement that a subscribe/unsubscribe request was applied.
    SubscriptionAck { channel: String, symbol: String },
    /// Upstream-initiated error, not necessarily fatal to the connection.
    Error { message: String },
}

/// A single raw price/size pair as carried on the wire (strings to avoid
/// float rounding before the `rust_decimal` parse).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub size: String,
}

/// Wire-format side tag, mapped to [`Side`] during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawSide {
    Buy,
    Sell,
}

impl From<RawSide> for Side {
    fn from(value: RawSide) -> Self {
        match value {
            RawSide::Buy => Side::Buy,
            RawSide::Sell => Side::Sell,
        }
    }
}

/// An outbound control frame the adapter sends to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Subscribe to one channel for one symbol.
    Subscribe { channel: String, symbol: String },
    /// Unsubscribe from one channel for one symbol.
    Unsubscribe { channel: String, symbol: String },
}

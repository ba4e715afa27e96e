//! Matching engine error types.

use crate::common::error::ErrorKind;
use crate::common::OrderId;
use std::fmt;

/// Errors that can occur while submitting, cancelling, or modifying an
/// order, or while reading a book snapshot.
#[derive(Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The symbol has no registered order book.
    UnknownSymbol(String),
    /// The order failed structural validation (bad price/quantity
    /// combination, missing required field for its order type, etc).
    MalformedOrder(String),
    /// Rejected by the delegated risk/compliance gate.
    RiskBlocked(String),
    /// Would self-cross and the book's self-cross policy forbids it.
    WouldSelfCross {
        /// The order id that would have self-crossed.
        order_id: OrderId,
    },
    /// The referenced order does not exist in the book.
    OrderNotFound(OrderId),
    /// The order is already in a terminal state; the requested mutation
    /// is a no-op returning the current state rather than an error at
    /// the call site, but this variant is used internally to signal that.
    AlreadyTerminal(OrderId),
    /// The symbol's state machine has been fatally aborted (corrupted
    /// invariant or sequence regression) and refuses further orders until
    /// operator intervention.
    SymbolAborted(String),
}

impl EngineError {
    /// Stable error-kind tag, per `spec.md` §7.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnknownSymbol(_) | EngineError::MalformedOrder(_) => {
                ErrorKind::Validation
            }
            EngineError::RiskBlocked(_) => ErrorKind::Business,
            EngineError::WouldSelfCross { .. } => ErrorKind::Validation,
            EngineError::OrderNotFound(_) | EngineError::AlreadyTerminal(_) => {
                ErrorKind::Validation
            }
            EngineError::SymbolAborted(_) => ErrorKind::Fatal,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownSymbol(symbol) => write!(f, "unknown symbol: {symbol}"),
            EngineError::MalformedOrder(detail) => write!(f, "malformed order: {detail}"),
            EngineError::RiskBlocked(reason) => write!(f, "risk/compliance block: {reason}"),
            EngineError::WouldSelfCross { order_id } => {
                write!(f, "order {order_id} would self-cross and policy forbids it")
            }
            EngineError::OrderNotFound(id) => write!(f, "order not found: {id}"),
            EngineError::AlreadyTerminal(id) => write!(f, "order already terminal: {id}"),
            EngineError::SymbolAborted(symbol) => {
                write!(f, "symbol {symbol} aborted, refusing further orders")
            }
        }
    }
}

impl std::error::Error for EngineError {}

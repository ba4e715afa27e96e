//! Crate-wide error taxonomy.
//!
//! Every externally visible error carries a stable [`ErrorKind`] tag plus a
//! human-readable detail, per the propagation policy of the error handling
//! design: local recovery for `Transport`/`Resource`, caller-visible
//! failures for `Validation`/`Business`/`Initialization`, fail-fast for
//! `Fatal`.

use std::fmt;

/// Stable, language-neutral error category.
///
/// Subsystem-specific error enums (engine, distributor, supervisor, feed)
/// each expose a `kind()` accessor returning one of these tags so that
/// callers can apply a uniform propagation policy without matching on
/// subsystem-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed input rejected at ingress; never retried.
    Validation,
    /// Resource exhaustion (memory pressure, full subscriber buffer).
    Resource,
    /// Lazy component initialization failure, timeout, or cancellation.
    Initialization,
    /// Transport-level failure (disconnect, parse failure, protocol
    /// violation), recovered locally via reconnect/backoff.
    Transport,
    /// Delegated business rule rejection (risk, compliance).
    Business,
    /// Corrupted invariant; the affected state machine is aborted.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Resource => "resource",
            ErrorKind::Initialization => "initialization",
            ErrorKind::Transport => "transport",
            ErrorKind::Business => "business",
            ErrorKind::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// A generic cross-subsystem error carrying a stable [`ErrorKind`] and a
/// human-readable detail string.
///
/// Subsystem modules generally define their own richer error enums (see
/// `engine::error::EngineError`, `distributor::error::DistributorError`,
/// `supervisor::error::SupervisorError`, `distributor::provider::ProviderError`)
/// and convert into `CoreError` only at a module boundary where the caller
/// no longer needs the variant-specific fields.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CoreError {
    /// The stable error category.
    pub kind: ErrorKind,
    /// Human-readable detail message.
    pub detail: String,
}

impl CoreError {
    /// Construct a new `CoreError` with the given kind and detail.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns the stable error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

impl std::error::Error for CoreError {}

//! Market-data distributor error types.

use crate::common::error::ErrorKind;
use std::fmt;

/// Errors raised by [`crate::distributor::MarketDataDistributor`].
#[derive(Debug)]
#[non_exhaustive]
pub enum DistributorError {
    /// The symbol is not known to the distributor.
    UnknownSymbol(String),
    /// A cached value exists but is older than the configured freshness
    /// window.
    Stale {
        /// Age of the cached value, in milliseconds.
        age_millis: u64,
    },
    /// No cached value and no feed/provider could supply one in time.
    ProviderTimeout,
    /// The upstream provider returned an error while servicing a
    /// synchronous pull.
    ProviderError(String),
    /// The subscription key (symbol, data-type[, interval]) is malformed,
    /// e.g. an OHLCV subscription missing its interval.
    BadSubscriptionKey(String),
}

impl DistributorError {
    /// Stable error-kind tag, per `spec.md` §7.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DistributorError::UnknownSymbol(_) | DistributorError::BadSubscriptionKey(_) => {
                ErrorKind::Validation
            }
            DistributorError::Stale { .. } => ErrorKind::Resource,
            DistributorError::ProviderTimeout | DistributorError::ProviderError(_) => {
                ErrorKind::Transport
            }
        }
    }
}

impl fmt::Display for DistributorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributorError::UnknownSymbol(s) => write!(f, "unknown symbol: {s}"),
            DistributorError::Stale { age_millis } => {
                write!(f, "cached value is stale ({age_millis}ms old)")
            }
            DistributorError::ProviderTimeout => write!(f, "provider pull timed out"),
            DistributorError::ProviderError(detail) => write!(f, "provider error: {detail}"),
            DistributorError::BadSubscriptionKey(detail) => {
                write!(f, "bad subscription key: {detail}")
            }
        }
    }
}

impl std::error::Error for DistributorError {}

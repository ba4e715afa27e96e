//! OHLCV candle derivation, `spec.md` §3 "OHLCVBucket", §4.2 "Ticker/OHLCV
//! derivation".

use crate::common::{Price, Quantity};
use crate::distributor::subscription::Interval;
use crate::engine::trade::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One candle. Immutable once its interval boundary is crossed (`closed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBucket {
    /// Trading symbol.
    pub symbol: String,
    /// Candle interval.
    pub interval: Interval,
    /// Bucket-start timestamp, milliseconds since epoch, aligned to
    /// `interval`.
    pub bucket_start: u64,
    /// Opening price (price of the first trade in the bucket).
    pub open: Price,
    /// Highest trade price in the bucket so far.
    pub high: Price,
    /// Lowest trade price in the bucket so far.
    pub low: Price,
    /// Most recent trade price in the bucket.
    pub close: Price,
    /// Cumulative traded volume in the bucket.
    pub volume: Quantity,
    /// `true` once a later trade has crossed this bucket's boundary;
    /// closed buckets never mutate further.
    pub closed: bool,
}

impl OhlcvBucket {
    fn opening(symbol: &str, interval: Interval, bucket_start: u64, price: Decimal, qty: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            bucket_start,
            open: Price::new(price),
            high: Price::new(price),
            low: Price::new(price),
            close: Price::new(price),
            volume: Quantity::new(qty),
            closed: false,
        }
    }

    fn fold_in(&mut self, price: Decimal, qty: Decimal) {
        self.high = Price::new(self.high.as_decimal().max(price));
        self.low = Price::new(self.low.as_decimal().min(price));
        self.close = Price::new(price);
        self.volume = self.volume + Quantity::new(qty);
    }
}

fn bucket_start_for(timestamp: u64, interval: Interval) -> u64 {
    let width = interval.millis();
    (timestamp / width) * width
}

/// Per-(symbol, interval) bucket accumulator. On the first trade of a new
/// bucket, the prior bucket (if any) is returned closed for emission and a
/// fresh bucket is opened.
#[derive(Debug)]
pub struct OhlcvTracker {
    symbol: String,
    interval: Interval,
    current: Option<OhlcvBucket>,
}

impl OhlcvTracker {
    /// Create a tracker for `(symbol, interval)` with no open bucket.
    #[must_use]
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            current: None,
        }
    }

    /// Fold `trade` into the active bucket. Returns `Some(closed bucket)`
    /// when this trade started a new interval, in which case the caller
    /// should emit the closed bucket as an immutable event.
    pub fn ingest(&mut self, trade: &Trade) -> Option<OhlcvBucket> {
        let start = bucket_start_for(trade.timestamp, self.interval);
        let price = trade.price.as_decimal();
        let qty = trade.quantity.as_decimal();

        match &mut self.current {
            Some(bucket) if bucket.bucket_start == start => {
                bucket.fold_in(price, qty);
                None
            }
            Some(bucket) => {
                let mut closed = bucket.clone();
                closed.closed = true;
                self.current = Some(OhlcvBucket::opening(&self.symbol, self.interval, start, price, qty));
                Some(closed)
            }
            None => {
                self.current = Some(OhlcvBucket::opening(&self.symbol, self.interval, start, price, qty));
                None
            }
        }
    }

    /// The currently open (not yet closed) bucket, if any.
    #[must_use]
    pub fn current(&self) -> Option<&OhlcvBucket> {
        self.current.as_ref()
    }
}

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;

// ------------------------------------------------------------
// Candle
// ------------------------------------------------------------
//
// One closed, fixed-duration time bucket of a series.
//
// Identity is (symbol, interval, open_time). The symbol and
// interval live on the `Series` the candle is written to, so a
// candle on its own only carries its open time as key.
//
// Prices and quantities are `Decimal`: exchanges send them as
// strings and converting through f64 would lose precision.
//
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, milliseconds since Unix epoch
    pub open_time: i64,

    /// Bucket end (inclusive), milliseconds since Unix epoch
    ///
    /// INVARIANT: `close_time > open_time`
    pub close_time: i64,

    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,

    /// Number of trades executed within the bucket
    pub trade_num: i64,
}

impl Candle {
    /// Empirical bucket width: `close_time - open_time + 1`.
    pub fn duration(&self) -> i64 {
        self.close_time - self.open_time + 1
    }

    /// Whether the candle satisfies `close_time > open_time`.
    pub fn is_well_formed(&self) -> bool {
        self.close_time > self.open_time
    }
}

// ------------------------------------------------------------
// Stream event
// ------------------------------------------------------------
//
// A single live feed message. Only `is_final` events describe
// a closed candle; everything else is an in-progress tick.
//
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Exchange event time in milliseconds
    pub event_time: i64,

    /// Candle snapshot carried by the event
    pub candle: Candle,

    /// True once the bucket is closed and immutable
    pub is_final: bool,
}

// ------------------------------------------------------------
// Series
// ------------------------------------------------------------

/// The candle history of one `(symbol, interval)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Series {
    pub symbol: String,
    pub interval: Interval,
}

impl Series {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.interval)
    }
}

// ------------------------------------------------------------
// Gap
// ------------------------------------------------------------
//
// A time range with no persisted candle. Gaps are derived from
// the stored series on every pass and never stored themselves.
//
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: i64,
    pub end: i64,
}

impl Gap {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

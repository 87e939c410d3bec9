use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::schema::{Candle, Series, StreamEvent};

/// Result of parsing one raw live feed frame.
///
/// - `Event`: a kline snapshot (final or in-progress)
/// - `Control`: acks, heartbeats, anything without market data
/// - `Error`: a frame that should have carried data but could not be decoded
#[derive(Debug)]
pub enum ParseResult {
    Event(StreamEvent),
    Control,
    Error(SourceError),
}

/// A live subscription: two independently owned channels.
///
/// Both close when the subscription ends, including on cancellation.
/// The producer side owns the senders; consumers never share state.
#[derive(Debug)]
pub struct Subscription {
    pub events: mpsc::Receiver<StreamEvent>,
    pub errors: mpsc::Receiver<SourceError>,
}

/// MarketDataSource is the abstraction layer between:
/// - The collector / gap fixer
/// - Exchange-specific REST and WebSocket APIs
///
/// Each exchange implementation must:
/// - Return historical candles ordered by open time
/// - Stream kline events for one series
/// - Normalize decimals without silent precision loss
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - Instances are shared across tasks
///
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Canonical source name, e.g. "binance".
    fn name(&self) -> &'static str;

    /// Largest `limit` a single `fetch_range` call honors, if bounded.
    ///
    /// A page shorter than the requested limit means "no more data",
    /// so callers must never ask for more than this.
    fn max_batch(&self) -> Option<usize> {
        None
    }

    /// Candles with `open_time` in `[start, end]`, ascending, at most `limit`.
    ///
    /// An empty list means the source has no data in the range.
    async fn fetch_range(
        &self,
        series: &Series,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError>;

    /// Opens a live kline subscription for `series`.
    ///
    /// The subscription runs until `cancel` fires or the source gives up;
    /// transport errors are delivered on `Subscription::errors`.
    async fn subscribe(
        &self,
        series: &Series,
        cancel: CancellationToken,
    ) -> Result<Subscription, SourceError>;
}

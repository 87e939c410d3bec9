#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use kline_watcher::{
    Candle, Series, SourceError, StoreError, StreamEvent,
    exchanges::{MarketDataSource, Subscription},
    storage::{MemoryStore, SeriesStore},
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn series() -> Series {
    Series::new("BTCUSDT", "1m".parse().unwrap())
}

/// Candle of width 10 starting at `open_time`.
pub fn candle(open_time: i64) -> Candle {
    Candle {
        open_time,
        close_time: open_time + 9,
        open: Decimal::new(100, 0),
        high: Decimal::new(110, 0),
        low: Decimal::new(90, 0),
        close: Decimal::new(105, 0),
        volume: Decimal::new(12345, 3),
        trade_num: 7,
    }
}

/// Width-10 candles for every open time in `[from, to)` stepping by 10.
pub fn candles(from: i64, to: i64) -> Vec<Candle> {
    (from..to).step_by(10).map(candle).collect()
}

pub fn event(open_time: i64, is_final: bool) -> StreamEvent {
    StreamEvent {
        event_time: open_time + 5,
        candle: candle(open_time),
        is_final,
    }
}

pub fn open_times(rows: &[Candle]) -> Vec<i64> {
    rows.iter().map(|c| c.open_time).collect()
}

/// One step of a scripted live feed.
pub enum Step {
    Event(StreamEvent),
    Error(SourceError),
    /// Cancels the run token once every earlier event has been taken.
    Cancel,
}

/// MarketDataSource serving a fixed history and a scripted live feed.
pub struct ScriptedSource {
    history: Vec<Candle>,
    script: Mutex<Option<Vec<Step>>>,
    run_cancel: Option<CancellationToken>,
    hold_open: bool,
    fail_fetch: bool,
    max_batch: Option<usize>,
    pub fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn with_history(history: Vec<Candle>) -> Self {
        Self {
            history,
            script: Mutex::new(None),
            run_cancel: None,
            hold_open: false,
            fail_fetch: false,
            max_batch: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_script(script: Vec<Step>) -> Self {
        let source = Self::with_history(Vec::new());
        *source.script.lock().unwrap() = Some(script);
        source
    }

    /// Token cancelled by `Step::Cancel`.
    pub fn cancels(mut self, token: CancellationToken) -> Self {
        self.run_cancel = Some(token);
        self
    }

    /// Keep the feed open after the script until the subscription is cancelled.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn page_limit(mut self, max: usize) -> Self {
        self.max_batch = Some(max);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn max_batch(&self) -> Option<usize> {
        self.max_batch
    }

    async fn fetch_range(
        &self,
        _series: &Series,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(SourceError::Api {
                status: 500,
                body: "internal error".into(),
            });
        }
        Ok(self
            .history
            .iter()
            .filter(|c| c.open_time >= start && c.open_time <= end)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn subscribe(
        &self,
        _series: &Series,
        cancel: CancellationToken,
    ) -> Result<Subscription, SourceError> {
        let script = self.script.lock().unwrap().take().unwrap_or_default();
        let run_cancel = self.run_cancel.clone();
        let hold_open = self.hold_open;

        // Capacity 1: a completed send proves the previous item was received
        let (events_tx, events) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);

        tokio::spawn(async move {
            for step in script {
                match step {
                    Step::Event(ev) => {
                        if events_tx.send(ev).await.is_err() {
                            return;
                        }
                    }
                    Step::Error(e) => {
                        let _ = errors_tx.send(e).await;
                    }
                    Step::Cancel => {
                        let _ = events_tx.send(event(-1_000, false)).await;
                        if let Some(token) = &run_cancel {
                            token.cancel();
                        }
                    }
                }
            }
            if hold_open {
                cancel.cancelled().await;
            }
        });

        Ok(Subscription { events, errors })
    }
}

/// Store that fails chosen calls and delegates the rest.
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_writes_from: usize,
    fail_reads: bool,
    writes: AtomicUsize,
}

impl FlakyStore {
    /// Writes number `n` (0-based) and later fail.
    pub fn failing_from(n: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes_from: n,
            fail_reads: false,
            writes: AtomicUsize::new(0),
        }
    }

    /// Every read fails, writes succeed.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::failing_from(usize::MAX)
        }
    }
}

fn codec_error() -> StoreError {
    StoreError::Codec(serde_json::from_str::<u8>("not a number").unwrap_err())
}

#[async_trait::async_trait]
impl SeriesStore for FlakyStore {
    async fn read_range(
        &self,
        series: &Series,
        start: i64,
        end: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        if self.fail_reads {
            return Err(codec_error());
        }
        self.inner.read_range(series, start, end, limit, offset).await
    }

    async fn write_batch(&self, series: &Series, candles: &[Candle]) -> Result<(), StoreError> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_writes_from {
            return Err(codec_error());
        }
        self.inner.write_batch(series, candles).await
    }
}

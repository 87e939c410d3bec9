use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{CollectorSettings, ErrorHandler},
    error::{Error, SourceError, StoreOp},
    exchanges::{MarketDataSource, Subscription},
    metrics::METRICS,
    schema::{Candle, StreamEvent},
    storage::SeriesStore,
};

/// What a collector run achieved before the feed ended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectSummary {
    pub chunks_written: usize,
    pub candles_written: usize,
}

/// How one chunk cycle ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkEnd {
    /// Buffer reached `chunk_size`
    Full,
    /// The event stream closed
    StreamClosed,
}

/// Stream collector for a single series.
///
/// Runs two tasks per invocation:
/// - the ingest loop (this future): events -> chunk -> store
/// - the error drain (spawned): feed errors -> error handler
///
/// They share nothing but the handler; the subscription hands each
/// its own channel.
pub struct Collector {
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(settings: CollectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Collects until the feed ends, a store write fails, or `cancel` fires.
    ///
    /// RETURNS:
    /// - `Ok(summary)` when the subscription ended on its own
    /// - `Err(Error::Cancelled)` (possibly joined with a flush error) on cancellation
    /// - `Err(Error::Store { .. })` when a chunk could not be written
    ///
    /// A partial chunk is flushed before any error is returned.
    pub async fn run(
        &self,
        source: &dyn MarketDataSource,
        store: &dyn SeriesStore,
        cancel: CancellationToken,
    ) -> Result<CollectSummary, Error> {
        self.settings.validate(source.max_batch())?;
        let series = &self.settings.series;

        // Stops the feed when we leave, whatever the reason
        let feed_cancel = cancel.child_token();

        let Subscription { mut events, errors } = source
            .subscribe(series, feed_cancel.clone())
            .await
            .map_err(|source| Error::Subscribe {
                series: series.to_string(),
                source,
            })?;

        info!(
            "collecting {} from {} chunk-size={}",
            series,
            source.name(),
            self.settings.chunk_size
        );

        let drain = tokio::spawn(drain_errors(errors, self.error_handler()));

        let mut summary = CollectSummary::default();
        let result = loop {
            match self.process_chunk(&mut events, store, &cancel, &mut summary).await {
                Ok(ChunkEnd::Full) => continue,
                Ok(ChunkEnd::StreamClosed) => {
                    info!("feed for {series} ended");
                    break Ok(summary);
                }
                Err(e) => break Err(e),
            }
        };

        feed_cancel.cancel();
        drop(events);
        if let Err(e) = drain.await {
            warn!("error drain for {series} did not finish cleanly: {e}");
        }

        result
    }

    fn error_handler(&self) -> ErrorHandler {
        match &self.settings.error_handler {
            Some(handler) => handler.clone(),
            None => {
                let log_error: ErrorHandler = Arc::new(|e: &SourceError| error!("feed error: {e}"));
                log_error
            }
        }
    }

    /// One chunk cycle: accumulate, then flush.
    ///
    /// On error the buffered candles are flushed before the error is
    /// returned; a failing flush is joined to the original cause.
    async fn process_chunk(
        &self,
        events: &mut mpsc::Receiver<StreamEvent>,
        store: &dyn SeriesStore,
        cancel: &CancellationToken,
        summary: &mut CollectSummary,
    ) -> Result<ChunkEnd, Error> {
        let mut buffer = Vec::with_capacity(self.settings.chunk_size);

        match self.fill_chunk(events, &mut buffer, cancel).await {
            Ok(ChunkEnd::Full) => {
                self.flush(store, &buffer, summary).await?;
                Ok(ChunkEnd::Full)
            }

            Ok(ChunkEnd::StreamClosed) => {
                if !buffer.is_empty() {
                    if self.settings.flush_on_close {
                        self.flush(store, &buffer, summary).await?;
                    } else {
                        warn!(
                            "feed for {} closed with {} unflushed candles",
                            self.settings.series,
                            buffer.len()
                        );
                    }
                }
                Ok(ChunkEnd::StreamClosed)
            }

            Err(cause) if buffer.is_empty() => Err(cause),

            Err(cause) => match self.flush(store, &buffer, summary).await {
                Ok(()) => Err(cause),
                Err(write_err) => Err(Error::join([cause, write_err])),
            },
        }
    }

    /// Reads events until the buffer is full or the stream closes.
    ///
    /// Cancellation is only observed between events.
    async fn fill_chunk(
        &self,
        events: &mut mpsc::Receiver<StreamEvent>,
        buffer: &mut Vec<Candle>,
        cancel: &CancellationToken,
    ) -> Result<ChunkEnd, Error> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                event = events.recv() => event,
            };

            let Some(event) = event else {
                return Ok(ChunkEnd::StreamClosed);
            };

            METRICS.events_received.fetch_add(1, Ordering::Relaxed);
            if !event.is_final {
                continue;
            }
            METRICS.final_events.fetch_add(1, Ordering::Relaxed);

            buffer.push(event.candle);
            if buffer.len() >= self.settings.chunk_size {
                return Ok(ChunkEnd::Full);
            }
        }
    }

    async fn flush(
        &self,
        store: &dyn SeriesStore,
        buffer: &[Candle],
        summary: &mut CollectSummary,
    ) -> Result<(), Error> {
        let series = &self.settings.series;

        store
            .write_batch(series, buffer)
            .await
            .map_err(|source| Error::Store {
                op: StoreOp::Write,
                series: series.to_string(),
                source,
            })?;

        summary.chunks_written += 1;
        summary.candles_written += buffer.len();
        METRICS.chunks_flushed.fetch_add(1, Ordering::Relaxed);
        METRICS.candles_written.fetch_add(buffer.len(), Ordering::Relaxed);

        if self.settings.debug {
            info!("wrote {} klines", buffer.len());
        } else {
            debug!("wrote {} klines for {series}", buffer.len());
        }
        Ok(())
    }
}

/// Passes every feed error to the handler until the error stream closes.
async fn drain_errors(mut errors: mpsc::Receiver<SourceError>, handler: ErrorHandler) {
    while let Some(err) = errors.recv().await {
        METRICS.feed_errors.fetch_add(1, Ordering::Relaxed);
        handler(&err);
    }
}

//! Gap reconciliation
//!
//! Scans a stored series page by page, derives missing ranges from the
//! page contents and backfills them from the market data source.
//!
//! The engine keeps no state between runs. Every pass recomputes gaps
//! from what the store holds right now, so re-running after a failure
//! is always safe and a second run over a repaired window writes nothing.
//!
//! SCANNING -> (gap found) -> BACKFILLING -> SCANNING -> ... -> DONE | FAILED

mod gaps;

use std::sync::atomic::Ordering;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

pub use gaps::find_gaps;

use crate::{
    config::FixGapsRequest,
    error::{Error, StoreOp},
    exchanges::MarketDataSource,
    metrics::METRICS,
    schema::{Candle, Gap, Series},
    storage::SeriesStore,
    util,
};

/// Counters of one `fix_gaps` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixReport {
    pub pages_scanned: usize,
    pub gaps_found: usize,
    pub fetches: usize,
    pub batches_written: usize,
    pub candles_backfilled: usize,
}

/// Counters of one gap backfill.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Backfill {
    pub fetches: usize,
    pub batches_written: usize,
    pub candles: usize,
}

/// Repairs every gap of `req.series` inside `[req.from, req.to]`.
///
/// Stops at the first unrecoverable error; nothing is retried here.
/// Cancellation is honored between pages, gaps and fetches, never
/// in the middle of a write.
pub async fn fix_gaps(
    source: &dyn MarketDataSource,
    store: &dyn SeriesStore,
    req: &FixGapsRequest,
    cancel: &CancellationToken,
) -> Result<FixReport, Error> {
    req.validate(source.max_batch())?;

    let series = &req.series;
    let mut report = FixReport::default();
    let mut open_cursor = req.from;

    info!(
        "fixing gaps for {} in [{}, {}] chunk-size={}",
        series, req.from, req.to, req.chunk_size
    );

    while open_cursor < req.to {
        ensure_active(cancel)?;

        let page = store
            .read_range(series, open_cursor, req.to, req.chunk_size, 0)
            .await
            .map_err(|source| Error::Store {
                op: StoreOp::Read,
                series: series.to_string(),
                source,
            })?;
        report.pages_scanned += 1;
        METRICS.pages_scanned.fetch_add(1, Ordering::Relaxed);

        for gap in find_gaps(&page, open_cursor, req.to, req.chunk_size) {
            ensure_active(cancel)?;

            info!("{series}: gap {gap}");
            report.gaps_found += 1;
            METRICS.gaps_found.fetch_add(1, Ordering::Relaxed);

            let filled = backfill_gap(source, store, series, gap, req.chunk_size, cancel).await?;
            report.fetches += filled.fetches;
            report.batches_written += filled.batches_written;
            report.candles_backfilled += filled.candles;
        }

        // A short page is the edge of stored history for this run
        match page.last() {
            Some(last) if page.len() >= req.chunk_size => open_cursor = last.close_time + 1,
            _ => break,
        }
    }

    info!(
        "{series}: {} pages scanned, {} gaps, {} candles backfilled",
        report.pages_scanned, report.gaps_found, report.candles_backfilled
    );
    Ok(report)
}

/// Fetches `gap` from the source in `chunk_size` pages and writes each page.
///
/// Candles whose close time is not yet in the past are never written.
///
/// Ends when the source returns nothing, returns a short page, reaches
/// the present, or the cursor reaches the end of the gap. A gap may
/// legitimately stay partially filled (no data near "now" or in
/// exchange dead zones).
pub async fn backfill_gap(
    source: &dyn MarketDataSource,
    store: &dyn SeriesStore,
    series: &Series,
    gap: Gap,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<Backfill, Error> {
    let mut filled = Backfill::default();
    let mut start = gap.start;

    while start < gap.end {
        ensure_active(cancel)?;

        let candles = source
            .fetch_range(series, start, gap.end, chunk_size)
            .await
            .map_err(|source| Error::Fetch {
                series: series.to_string(),
                start,
                end: gap.end,
                source,
            })?;
        filled.fetches += 1;

        // Sources also return the bucket still in progress
        let fetched = candles.len();
        let now = util::now_ms();
        let candles: Vec<Candle> = candles.into_iter().filter(|c| c.close_time < now).collect();
        let reached_now = candles.len() < fetched;
        if reached_now {
            debug!(
                "{series}: skipped {} candles still open at {now}",
                fetched - candles.len()
            );
        }

        let Some(last) = candles.last() else {
            if !reached_now {
                debug!("{series}: source has no data in [{start}, {}]", gap.end);
            }
            break;
        };
        let next = last.close_time + 1;

        store
            .write_batch(series, &candles)
            .await
            .map_err(|source| Error::Store {
                op: StoreOp::Write,
                series: series.to_string(),
                source,
            })?;
        filled.batches_written += 1;
        filled.candles += candles.len();
        METRICS
            .candles_backfilled
            .fetch_add(candles.len(), Ordering::Relaxed);

        if fetched < chunk_size || reached_now || next >= gap.end {
            break;
        }
        if next <= start {
            warn!("{series}: source page ending at {} does not advance past {start}", last.close_time);
            break;
        }
        start = next;
    }

    Ok(filled)
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), Error> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

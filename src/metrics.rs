use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the watcher.
///
/// Purpose:
/// - Track live feed throughput (received / finalized events)
/// - Track store writes (chunks / candles)
/// - Track gap reconciliation progress
///
/// Design:
/// - Lock-free (Atomics)
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // Live feed
    pub events_received: AtomicUsize,
    pub final_events: AtomicUsize,
    pub feed_errors: AtomicUsize,
    pub ws_reconnects: AtomicUsize,

    // Store writes
    pub chunks_flushed: AtomicUsize,
    pub candles_written: AtomicUsize,

    // Gap reconciliation
    pub pages_scanned: AtomicUsize,
    pub gaps_found: AtomicUsize,
    pub candles_backfilled: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line summary used by the periodic reporter.
    pub fn summary(&self) -> String {
        format!(
            "recv={} final={} feed_err={} reconnects={} chunks={} written={} pages={} gaps={} backfilled={}",
            self.events_received.load(Ordering::Relaxed),
            self.final_events.load(Ordering::Relaxed),
            self.feed_errors.load(Ordering::Relaxed),
            self.ws_reconnects.load(Ordering::Relaxed),
            self.chunks_flushed.load(Ordering::Relaxed),
            self.candles_written.load(Ordering::Relaxed),
            self.pages_scanned.load(Ordering::Relaxed),
            self.gaps_found.load(Ordering::Relaxed),
            self.candles_backfilled.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));

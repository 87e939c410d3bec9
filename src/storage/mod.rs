//! Series storage
//!
//! The store is the only state shared between the collector and the
//! gap fixer. Writes are insert-if-absent per `(series, open_time)`
//! and atomic per batch, so concurrent writers converge.

pub mod memory;
pub mod redis_store;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::schema::{Candle, Series};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[async_trait::async_trait]
pub trait SeriesStore: Send + Sync {
    /// Candles with `open_time` in `[start, end]`, ascending.
    ///
    /// `limit` caps the page size, `offset` skips rows from the start.
    async fn read_range(
        &self,
        series: &Series,
        start: i64,
        end: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Candle>, StoreError>;

    /// Inserts every candle whose open time is not stored yet.
    ///
    /// CONTRACT:
    /// - Existing keys are left untouched, duplicates are not an error
    /// - All-or-nothing: a failed batch leaves nothing visible
    async fn write_batch(&self, series: &Series, candles: &[Candle]) -> Result<(), StoreError>;
}

/// Opens the store described by the configuration.
///
/// DEMO MODE:
/// - Nothing is persisted; candles live in memory for the process lifetime
pub async fn open(cfg: &StoreConfig) -> Result<Arc<dyn SeriesStore>, StoreError> {
    if cfg.is_demo() {
        log::warn!("store running in DEMO mode, nothing is persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = RedisStore::connect(&cfg.url).await?;
    Ok(Arc::new(store))
}

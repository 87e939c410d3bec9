use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::schema::{Candle, Series};
use crate::util;

use super::SeriesStore;

type SeriesKey = (String, String);

/// In-process store used by demo mode and tests.
///
/// Same contract as the Redis store: ordered by open time,
/// insert-if-absent, one lock per batch.
#[derive(Default)]
pub struct MemoryStore {
    series: Mutex<HashMap<SeriesKey, BTreeMap<i64, Candle>>>,
    batches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_batch` calls that reached the store.
    pub fn write_batches(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Full content of one series, ascending.
    pub async fn snapshot(&self, series: &Series) -> Vec<Candle> {
        self.series
            .lock()
            .await
            .get(&key(series))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn key(series: &Series) -> SeriesKey {
    (
        util::storage_symbol(&series.symbol),
        series.interval.to_string(),
    )
}

#[async_trait::async_trait]
impl SeriesStore for MemoryStore {
    async fn read_range(
        &self,
        series: &Series,
        start: i64,
        end: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }

        let all = self.series.lock().await;
        let Some(rows) = all.get(&key(series)) else {
            return Ok(Vec::new());
        };

        Ok(rows
            .range(start..=end)
            .skip(offset)
            .take(limit)
            .map(|(_, candle)| candle.clone())
            .collect())
    }

    async fn write_batch(&self, series: &Series, candles: &[Candle]) -> Result<(), StoreError> {
        self.batches.fetch_add(1, Ordering::Relaxed);

        let mut all = self.series.lock().await;
        let rows = all.entry(key(series)).or_default();
        for candle in candles {
            rows.entry(candle.open_time)
                .or_insert_with(|| candle.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn candle(open_time: i64, close: i64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 9,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::from(close),
            volume: Decimal::ZERO,
            trade_num: 1,
        }
    }

    fn series() -> Series {
        Series::new("BTCUSDT", "1m".parse().unwrap())
    }

    #[tokio::test]
    async fn duplicate_keys_keep_first_value() {
        let store = MemoryStore::new();
        store.write_batch(&series(), &[candle(0, 1)]).await.unwrap();
        store
            .write_batch(&series(), &[candle(0, 99), candle(10, 2)])
            .await
            .unwrap();

        let rows = store.snapshot(&series()).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].close, Decimal::ONE);
        assert_eq!(store.write_batches(), 2);
    }

    #[tokio::test]
    async fn reads_are_ordered_and_paged() {
        let store = MemoryStore::new();
        store
            .write_batch(&series(), &[candle(30, 0), candle(0, 0), candle(10, 0), candle(20, 0)])
            .await
            .unwrap();

        let page = store.read_range(&series(), 5, 30, 2, 0).await.unwrap();
        let opens: Vec<i64> = page.iter().map(|c| c.open_time).collect();
        assert_eq!(opens, vec![10, 20]);

        let page = store.read_range(&series(), 0, 30, 10, 3).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].open_time, 30);
    }

    #[tokio::test]
    async fn symbol_spelling_maps_to_one_series() {
        let store = MemoryStore::new();
        let slash = Series::new("BTC/USDT", "1m".parse().unwrap());
        store.write_batch(&slash, &[candle(0, 0)]).await.unwrap();
        assert_eq!(store.snapshot(&series()).await.len(), 1);
    }
}

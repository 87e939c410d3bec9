use redis::aio::MultiplexedConnection;

use crate::error::StoreError;
use crate::schema::{Candle, Series};
use crate::util;

use super::SeriesStore;

/// Redis-backed series store.
///
/// LAYOUT (per series):
/// - `kline:<symbol>:<interval>:index` sorted set, member = score = open_time
/// - `kline:<symbol>:<interval>:data`  hash, open_time -> candle JSON
///
/// Writes go through one MULTI/EXEC transaction with `ZADD NX` and
/// `HSETNX`, so an existing open time is never overwritten and a batch
/// becomes visible at once.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

/// Index and data key names for a series.
pub fn series_keys(series: &Series) -> (String, String) {
    let base = format!(
        "kline:{}:{}",
        util::storage_symbol(&series.symbol),
        series.interval
    );
    (format!("{base}:index"), format!("{base}:data"))
}

/// Decodes an HMGET reply, one row per indexed open time.
///
/// An index entry without its row would make the page look short,
/// so it is reported instead of skipped.
fn decode_rows(
    data_key: &str,
    open_times: &[i64],
    rows: Vec<Option<String>>,
) -> Result<Vec<Candle>, StoreError> {
    open_times
        .iter()
        .zip(rows)
        .map(|(&open_time, row)| {
            let raw = row.ok_or_else(|| StoreError::MissingRow {
                key: data_key.to_string(),
                open_time,
            })?;
            Ok(serde_json::from_str::<Candle>(&raw)?)
        })
        .collect()
}

#[async_trait::async_trait]
impl SeriesStore for RedisStore {
    async fn read_range(
        &self,
        series: &Series,
        start: i64,
        end: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Candle>, StoreError> {
        if limit == 0 || start > end {
            return Ok(Vec::new());
        }

        let (index, data) = series_keys(series);
        let mut conn = self.conn.clone();

        let open_times: Vec<i64> = redis::cmd("ZRANGEBYSCORE")
            .arg(&index)
            .arg(start)
            .arg(end)
            .arg("LIMIT")
            .arg(offset)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        if open_times.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&data)
            .arg(&open_times)
            .query_async(&mut conn)
            .await?;

        decode_rows(&data, &open_times, rows)
    }

    async fn write_batch(&self, series: &Series, candles: &[Candle]) -> Result<(), StoreError> {
        if candles.is_empty() {
            return Ok(());
        }

        // Encode everything before touching the connection
        let encoded = candles
            .iter()
            .map(|c| serde_json::to_string(c).map(|raw| (c.open_time, raw)))
            .collect::<Result<Vec<_>, _>>()?;

        let (index, data) = series_keys(series);
        let mut pipe = redis::pipe();
        pipe.atomic();

        for (open_time, raw) in &encoded {
            pipe.cmd("HSETNX").arg(&data).arg(open_time).arg(raw).ignore();
            pipe.cmd("ZADD")
                .arg(&index)
                .arg("NX")
                .arg(open_time)
                .arg(open_time)
                .ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

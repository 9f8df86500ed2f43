use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use log::error;
use rustc_hash::FxHashMap;

use crate::db::models::{Candle1m, CandleTick};
use crate::db::PostgresClient;

const COLS_PER_ROW: usize = 9;
const CHUNK_SIZE: usize = 300;

/// 1-minute OHLCV writer.
///
/// A flush coalesces all ticks into per-(pool, minute) aggregates, resolves
/// each bucket's `open` (previous minute's close when one exists, else the
/// bucket's first price), and lands everything in one upsert per chunk.
#[derive(Clone)]
pub struct CandleFlusher {
    db: Arc<PostgresClient>,
}

impl CandleFlusher {
    pub fn new(db: Arc<PostgresClient>) -> Self {
        Self { db }
    }
}

/// In-batch aggregate for one (pool, minute) key.
#[derive(Debug, Clone)]
pub struct PendingCandle {
    pub pool_id: i64,
    pub bucket_start: DateTime<Utc>,
    pub first_price: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_native: f64,
    pub trade_count: i64,
    pub liquidity_native: Option<f64>,
}

/// Coalesce raw ticks by (pool, minute): high = max, low = min, close = last
/// observation in enqueue order, volume and trade counts summed.
pub fn coalesce(ticks: Vec<CandleTick>) -> Vec<PendingCandle> {
    let mut buckets: FxHashMap<(i64, DateTime<Utc>), PendingCandle> = FxHashMap::default();
    let mut order: Vec<(i64, DateTime<Utc>)> = Vec::new();

    for tick in ticks {
        let key = (tick.pool_id, tick.bucket_start);
        match buckets.get_mut(&key) {
            Some(agg) => {
                agg.high = agg.high.max(tick.price);
                agg.low = agg.low.min(tick.price);
                agg.close = tick.price;
                agg.volume_native += tick.volume_native;
                agg.trade_count += tick.trade_count;
                if tick.liquidity_native.is_some() {
                    agg.liquidity_native = tick.liquidity_native;
                }
            },
            None => {
                order.push(key);
                buckets.insert(
                    key,
                    PendingCandle {
                        pool_id: tick.pool_id,
                        bucket_start: tick.bucket_start,
                        first_price: tick.price,
                        high: tick.price,
                        low: tick.price,
                        close: tick.price,
                        volume_native: tick.volume_native,
                        trade_count: tick.trade_count,
                        liquidity_native: tick.liquidity_native,
                    },
                );
            },
        }
    }

    order.into_iter().filter_map(|k| buckets.remove(&k)).collect()
}

/// Resolve `open` for each pending bucket.
///
/// A prior close can come from the same batch (bucket m and m+1 flushed
/// together) or from `prev_closes` fetched from the store; absent both, the
/// bucket opens at its first observed price. High/low are widened to keep
/// `low <= open <= high` when the inherited open lies outside the bucket's
/// own trading range.
pub fn assemble(
    pending: Vec<PendingCandle>,
    prev_closes: &FxHashMap<(i64, DateTime<Utc>), f64>,
) -> Vec<Candle1m> {
    let in_batch: FxHashMap<(i64, DateTime<Utc>), f64> = pending
        .iter()
        .map(|c| ((c.pool_id, c.bucket_start), c.close))
        .collect();

    pending
        .into_iter()
        .map(|c| {
            let prev_minute = c.bucket_start - TimeDelta::minutes(1);
            let prev_key = (c.pool_id, prev_minute);
            let open = in_batch
                .get(&prev_key)
                .or_else(|| prev_closes.get(&prev_key))
                .copied()
                .unwrap_or(c.first_price);

            Candle1m {
                pool_id: c.pool_id,
                bucket_start: c.bucket_start,
                open,
                high: c.high.max(open),
                low: c.low.min(open),
                close: c.close,
                volume_native: c.volume_native,
                trade_count: c.trade_count,
                liquidity_native: c.liquidity_native,
            }
        })
        .collect()
}

impl CandleFlusher {
    /// One lookup for the previous-minute closes of every affected key.
    async fn fetch_prev_closes(
        &self,
        pending: &[PendingCandle],
    ) -> anyhow::Result<FxHashMap<(i64, DateTime<Utc>), f64>> {
        let pool_ids: Vec<i64> = pending.iter().map(|c| c.pool_id).collect();
        let prev_starts: Vec<DateTime<Utc>> = pending
            .iter()
            .map(|c| c.bucket_start - TimeDelta::minutes(1))
            .collect();

        let client = self.db.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT c.pool_id, c.bucket_start, c.close
                FROM indexer.ohlcv_1m c
                JOIN UNNEST($1::bigint[], $2::timestamptz[]) AS k(pool_id, bucket_start)
                    ON c.pool_id = k.pool_id AND c.bucket_start = k.bucket_start
                "#,
                &[&pool_ids, &prev_starts],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    (r.get::<_, i64>("pool_id"), r.get::<_, DateTime<Utc>>("bucket_start")),
                    r.get::<_, f64>("close"),
                )
            })
            .collect())
    }
}

impl CandleFlusher {
    pub async fn flush(&self, items: Vec<CandleTick>) -> anyhow::Result<()> {
        let pending = coalesce(items);
        if pending.is_empty() {
            return Ok(());
        }

        let prev_closes = self.fetch_prev_closes(&pending).await?;
        let candles = assemble(pending, &prev_closes);

        let client = self.db.pool.get().await?;

        for chunk in candles.chunks(CHUNK_SIZE) {
            let values_clauses: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let start = i * COLS_PER_ROW + 1;
                    let placeholders: Vec<String> = (start..start + COLS_PER_ROW)
                        .map(|n| format!("${}", n))
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO indexer.ohlcv_1m (
                    pool_id, bucket_start, open, high, low, close,
                    volume_native, trade_count, liquidity_native
                ) VALUES {}
                ON CONFLICT (pool_id, bucket_start) DO UPDATE SET
                    high = GREATEST(indexer.ohlcv_1m.high, EXCLUDED.high),
                    low = LEAST(indexer.ohlcv_1m.low, EXCLUDED.low),
                    close = EXCLUDED.close,
                    volume_native = indexer.ohlcv_1m.volume_native + EXCLUDED.volume_native,
                    trade_count = indexer.ohlcv_1m.trade_count + EXCLUDED.trade_count,
                    liquidity_native = COALESCE(EXCLUDED.liquidity_native, indexer.ohlcv_1m.liquidity_native)
                "#,
                values_clauses.join(", ")
            );

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for candle in chunk {
                params.push(&candle.pool_id);
                params.push(&candle.bucket_start);
                params.push(&candle.open);
                params.push(&candle.high);
                params.push(&candle.low);
                params.push(&candle.close);
                params.push(&candle.volume_native);
                params.push(&candle.trade_count);
                params.push(&candle.liquidity_native);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch upsert {} candles: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minute(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap()
    }

    fn tick(pool_id: i64, m: u32, price: f64, volume: f64) -> CandleTick {
        CandleTick {
            pool_id,
            bucket_start: minute(m),
            price,
            volume_native: volume,
            trade_count: 1,
            liquidity_native: None,
        }
    }

    #[test]
    fn coalesce_aggregates_per_minute() {
        let pending = coalesce(vec![
            tick(1, 0, 1.0, 10.0),
            tick(1, 0, 3.0, 5.0),
            tick(1, 0, 2.0, 1.0),
            tick(2, 0, 7.0, 2.0),
        ]);

        assert_eq!(pending.len(), 2);
        let p1 = pending.iter().find(|c| c.pool_id == 1).unwrap();
        assert_eq!(p1.first_price, 1.0);
        assert_eq!(p1.high, 3.0);
        assert_eq!(p1.low, 1.0);
        assert_eq!(p1.close, 2.0);
        assert_eq!(p1.volume_native, 16.0);
        assert_eq!(p1.trade_count, 3);
    }

    #[test]
    fn open_prefers_stored_prior_close() {
        let pending = coalesce(vec![tick(1, 5, 1.10, 0.0)]);
        let mut prev = FxHashMap::default();
        prev.insert((1_i64, minute(4)), 1.0);

        let candles = assemble(pending, &prev);
        assert_eq!(candles[0].open, 1.0);
        assert_eq!(candles[0].close, 1.10);
        // open widened the low bound
        assert_eq!(candles[0].low, 1.0);
        assert_eq!(candles[0].high, 1.10);
    }

    #[test]
    fn open_chains_within_one_batch() {
        let pending = coalesce(vec![tick(1, 0, 1.0, 0.0), tick(1, 1, 1.10, 0.0)]);
        let candles = assemble(pending, &FxHashMap::default());

        let m0 = candles.iter().find(|c| c.bucket_start == minute(0)).unwrap();
        let m1 = candles.iter().find(|c| c.bucket_start == minute(1)).unwrap();
        assert_eq!(m0.open, 1.0);
        assert_eq!(m0.close, 1.0);
        assert_eq!(m1.open, 1.0, "open(m+1) must equal close(m)");
        assert_eq!(m1.close, 1.10);
    }

    #[test]
    fn open_falls_back_to_first_price() {
        let pending = coalesce(vec![tick(1, 9, 0.002, 0.0)]);
        let candles = assemble(pending, &FxHashMap::default());
        assert_eq!(candles[0].open, 0.002);
        assert_eq!(candles[0].high, 0.002);
        assert_eq!(candles[0].low, 0.002);
    }

    #[test]
    fn candle_bounds_hold() {
        let pending = coalesce(vec![tick(1, 3, 5.0, 1.0), tick(1, 3, 2.0, 1.0)]);
        let mut prev = FxHashMap::default();
        prev.insert((1_i64, minute(2)), 9.0);

        let candles = assemble(pending, &prev);
        let c = &candles[0];
        assert!(c.low <= c.open && c.open <= c.high);
        assert!(c.low <= c.close && c.close <= c.high);
        assert_eq!(c.high, 9.0);
    }
}

//! Pool and token matrix rollups.
//!
//! Rebuilds the rolling volume/TVL matrices for every bucket from trades,
//! prices, candles, pool state and holder data. Also exposes single-entity
//! fast paths used by the fast-track listener.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::info;
use rustc_hash::FxHashMap;

use crate::db::models::{Bucket, Pool, PoolMatrixRow, TokenMatrixRow, BUCKETS};
use crate::db::PostgresClient;
use crate::utils::display_amount;

/// Exponent of the native quote leg.
const NATIVE_EXP: i16 = 6;

/// Bounds of the base-denominated price salvage heuristic: when the latest
/// price row is 1e5-1e7 times the candle average for an exponent-6 token,
/// the row was written in BASE units upstream and is rescaled by 1e6.
const SCALE_RATIO_MIN: f64 = 1e5;
const SCALE_RATIO_MAX: f64 = 1e7;

pub struct RollupEngine {
    db: Arc<PostgresClient>,
    scale_heuristic: bool,
}

#[derive(Debug, Default, Clone)]
struct VolumeAgg {
    buy_quote_raw: String,
    sell_quote_raw: String,
    tx_buy: i64,
    tx_sell: i64,
    traders: i64,
}

/// Pick a token's matrix price from the two reserve-based candidates.
///
/// A = latest price row across native-quoted pools, B = 60-minute candle
/// close average. The guarded heuristic rescales A when it looks
/// base-denominated; otherwise A wins, then B, then 0.
pub fn resolve_token_price(
    a: Option<f64>,
    b: Option<f64>,
    exponent: Option<i16>,
    heuristic: bool,
) -> f64 {
    if let (Some(a), Some(b)) = (a, b) {
        if heuristic && b > 0.0 && exponent == Some(6) {
            let ratio = a / b;
            if (SCALE_RATIO_MIN..=SCALE_RATIO_MAX).contains(&ratio) {
                return a / 1e6;
            }
        }
    }
    a.or(b).unwrap_or(0.0)
}

impl RollupEngine {
    pub fn new(db: Arc<PostgresClient>, scale_heuristic: bool) -> Self {
        Self {
            db,
            scale_heuristic,
        }
    }

    /// Full rollup cycle across all buckets.
    pub async fn run(&self) -> Result<()> {
        let start = std::time::Instant::now();

        for bucket in BUCKETS {
            self.rollup_pools(bucket, None).await?;
            self.rollup_tokens(bucket, None).await?;
        }

        info!("Matrix rollup completed in {:?}", start.elapsed());
        Ok(())
    }

    /// Fast path: all buckets for one pool.
    pub async fn refresh_pool_matrix_once(&self, pool_id: i64) -> Result<()> {
        for bucket in BUCKETS {
            self.rollup_pools(bucket, Some(pool_id)).await?;
        }
        Ok(())
    }

    /// Fast path: all buckets for one token.
    pub async fn refresh_token_matrix_once(&self, token_id: i64) -> Result<()> {
        for bucket in BUCKETS {
            self.rollup_tokens(bucket, Some(token_id)).await?;
        }
        Ok(())
    }

    async fn rollup_pools(&self, bucket: Bucket, only_pool: Option<i64>) -> Result<()> {
        let pools = match only_pool {
            Some(id) => self.db.get_pool_by_id(id).await?.into_iter().collect(),
            None => self.db.list_pools().await?,
        };
        if pools.is_empty() {
            return Ok(());
        }

        let client = self.db.pool.get().await?;

        // Swap volume aggregates for the window
        let minutes = bucket.minutes() as i32;
        let volume_rows = client
            .query(
                r#"
                SELECT
                    t.pool_id,
                    COALESCE(SUM(CASE WHEN t.direction = 'buy'
                        THEN CAST(t.offer_amount_base AS NUMERIC) END), 0)::text AS buy_quote_raw,
                    COALESCE(SUM(CASE WHEN t.direction = 'sell'
                        THEN CAST(t.return_amount_base AS NUMERIC) END), 0)::text AS sell_quote_raw,
                    COUNT(*) FILTER (WHERE t.direction = 'buy') AS tx_buy,
                    COUNT(*) FILTER (WHERE t.direction = 'sell') AS tx_sell,
                    COUNT(DISTINCT t.signer) AS traders
                FROM indexer.trades t
                WHERE t.action = 'swap'
                  AND t.created_at >= NOW() - make_interval(mins => $1)
                  AND ($2::bigint IS NULL OR t.pool_id = $2)
                GROUP BY t.pool_id
                "#,
                &[&minutes, &only_pool],
            )
            .await?;

        let mut volumes: FxHashMap<i64, VolumeAgg> = FxHashMap::default();
        for row in &volume_rows {
            volumes.insert(
                row.get("pool_id"),
                VolumeAgg {
                    buy_quote_raw: row.get("buy_quote_raw"),
                    sell_quote_raw: row.get("sell_quote_raw"),
                    tx_buy: row.get("tx_buy"),
                    tx_sell: row.get("tx_sell"),
                    traders: row.get("traders"),
                },
            );
        }

        // Latest price rows, keyed two ways for the TVL fallback chain
        let price_rows = client
            .query(
                r#"
                SELECT token_id, pool_id, price_in_native, is_pair_native, updated_at
                FROM indexer.prices
                ORDER BY updated_at DESC
                "#,
                &[],
            )
            .await?;

        let mut price_by_token_pool: FxHashMap<(i64, i64), f64> = FxHashMap::default();
        let mut native_price_by_token: FxHashMap<i64, f64> = FxHashMap::default();
        for row in &price_rows {
            let token_id: i64 = row.get("token_id");
            let pool_id: i64 = row.get("pool_id");
            let price: f64 = row.get("price_in_native");
            let is_native: bool = row.get("is_pair_native");
            // Rows are newest-first; keep the first sighting per key.
            price_by_token_pool.entry((token_id, pool_id)).or_insert(price);
            if is_native {
                native_price_by_token.entry(token_id).or_insert(price);
            }
        }

        // Last candle close per pool (final TVL price fallback)
        let close_rows = client
            .query(
                r#"
                SELECT DISTINCT ON (pool_id) pool_id, close
                FROM indexer.ohlcv_1m
                ORDER BY pool_id, bucket_start DESC
                "#,
                &[],
            )
            .await?;
        let last_close: FxHashMap<i64, f64> = close_rows
            .iter()
            .map(|r| (r.get::<_, i64>("pool_id"), r.get::<_, f64>("close")))
            .collect();

        // Current reserves
        let state_rows = client
            .query(
                "SELECT pool_id, reserve_base_base, reserve_quote_base FROM indexer.pool_state",
                &[],
            )
            .await?;
        let reserves: FxHashMap<i64, (String, String)> = state_rows
            .iter()
            .map(|r| {
                (
                    r.get::<_, i64>("pool_id"),
                    (r.get("reserve_base_base"), r.get("reserve_quote_base")),
                )
            })
            .collect();

        // Assemble matrix rows
        let now = Utc::now();
        let rows: Vec<PoolMatrixRow> = pools
            .iter()
            .map(|pool| {
                let agg = volumes.get(&pool.id).cloned().unwrap_or_default();

                let quote_exp = if pool.is_native_quote {
                    NATIVE_EXP
                } else {
                    pool.quote_exponent.unwrap_or(NATIVE_EXP)
                };
                let buy_quote = display_amount(&agg.buy_quote_raw, Some(quote_exp));
                let sell_quote = display_amount(&agg.sell_quote_raw, Some(quote_exp));

                let quote_px = if pool.is_native_quote {
                    1.0
                } else {
                    native_price_by_token
                        .get(&pool.quote_token_id)
                        .copied()
                        .unwrap_or(0.0)
                };

                let (tvl, base_disp, quote_disp) = self.pool_tvl(
                    pool,
                    &reserves,
                    &price_by_token_pool,
                    &native_price_by_token,
                    &last_close,
                );

                PoolMatrixRow {
                    pool_id: pool.id,
                    bucket,
                    vol_buy_quote: buy_quote,
                    vol_sell_quote: sell_quote,
                    vol_buy_native: buy_quote * quote_px,
                    vol_sell_native: sell_quote * quote_px,
                    tx_buy: agg.tx_buy,
                    tx_sell: agg.tx_sell,
                    traders: agg.traders,
                    tvl_native: tvl,
                    reserve_base_disp: base_disp,
                    reserve_quote_disp: quote_disp,
                    updated_at: now,
                }
            })
            .collect();

        let pool_ids: Vec<i64> = rows.iter().map(|r| r.pool_id).collect();
        let vol_buy_quote: Vec<f64> = rows.iter().map(|r| r.vol_buy_quote).collect();
        let vol_sell_quote: Vec<f64> = rows.iter().map(|r| r.vol_sell_quote).collect();
        let vol_buy_native: Vec<f64> = rows.iter().map(|r| r.vol_buy_native).collect();
        let vol_sell_native: Vec<f64> = rows.iter().map(|r| r.vol_sell_native).collect();
        let tx_buy: Vec<i64> = rows.iter().map(|r| r.tx_buy).collect();
        let tx_sell: Vec<i64> = rows.iter().map(|r| r.tx_sell).collect();
        let traders: Vec<i64> = rows.iter().map(|r| r.traders).collect();
        let tvls: Vec<f64> = rows.iter().map(|r| r.tvl_native).collect();
        let reserve_base_disp: Vec<f64> = rows.iter().map(|r| r.reserve_base_disp).collect();
        let reserve_quote_disp: Vec<f64> = rows.iter().map(|r| r.reserve_quote_disp).collect();

        let bucket_label = bucket.label();
        client
            .execute(
                r#"
                INSERT INTO indexer.pool_matrix (
                    pool_id, bucket, vol_buy_quote, vol_sell_quote, vol_buy_native,
                    vol_sell_native, tx_buy, tx_sell, traders, tvl_native,
                    reserve_base_disp, reserve_quote_disp, updated_at
                )
                SELECT d.pool_id, $12::text, d.vol_buy_quote, d.vol_sell_quote,
                       d.vol_buy_native, d.vol_sell_native, d.tx_buy, d.tx_sell,
                       d.traders, d.tvl_native, d.reserve_base_disp,
                       d.reserve_quote_disp, $13::timestamptz
                FROM UNNEST(
                    $1::bigint[], $2::float8[], $3::float8[], $4::float8[],
                    $5::float8[], $6::bigint[], $7::bigint[], $8::bigint[],
                    $9::float8[], $10::float8[], $11::float8[]
                ) AS d(pool_id, vol_buy_quote, vol_sell_quote, vol_buy_native,
                       vol_sell_native, tx_buy, tx_sell, traders, tvl_native,
                       reserve_base_disp, reserve_quote_disp)
                ON CONFLICT (pool_id, bucket) DO UPDATE SET
                    vol_buy_quote = EXCLUDED.vol_buy_quote,
                    vol_sell_quote = EXCLUDED.vol_sell_quote,
                    vol_buy_native = EXCLUDED.vol_buy_native,
                    vol_sell_native = EXCLUDED.vol_sell_native,
                    tx_buy = EXCLUDED.tx_buy,
                    tx_sell = EXCLUDED.tx_sell,
                    traders = EXCLUDED.traders,
                    tvl_native = EXCLUDED.tvl_native,
                    reserve_base_disp = EXCLUDED.reserve_base_disp,
                    reserve_quote_disp = EXCLUDED.reserve_quote_disp,
                    updated_at = EXCLUDED.updated_at
                "#,
                &[
                    &pool_ids,
                    &vol_buy_quote,
                    &vol_sell_quote,
                    &vol_buy_native,
                    &vol_sell_native,
                    &tx_buy,
                    &tx_sell,
                    &traders,
                    &tvls,
                    &reserve_base_disp,
                    &reserve_quote_disp,
                    &bucket_label,
                    &now,
                ],
            )
            .await?;

        Ok(())
    }

    /// TVL in native units plus display reserves for one pool.
    ///
    /// Price fallback chain per leg: the pool's own price row, then the
    /// token's freshest native-quoted price, then the pool's last candle
    /// close (base leg only). Quote legs of native pools are identity.
    fn pool_tvl(
        &self,
        pool: &Pool,
        reserves: &FxHashMap<i64, (String, String)>,
        price_by_token_pool: &FxHashMap<(i64, i64), f64>,
        native_price_by_token: &FxHashMap<i64, f64>,
        last_close: &FxHashMap<i64, f64>,
    ) -> (f64, f64, f64) {
        let Some((base_raw, quote_raw)) = reserves.get(&pool.id) else {
            return (0.0, 0.0, 0.0);
        };

        let base_disp = display_amount(base_raw, pool.base_exponent);
        let quote_disp = display_amount(
            quote_raw,
            if pool.is_native_quote {
                Some(NATIVE_EXP)
            } else {
                pool.quote_exponent
            },
        );

        let base_px = price_by_token_pool
            .get(&(pool.base_token_id, pool.id))
            .or_else(|| native_price_by_token.get(&pool.base_token_id))
            .or_else(|| last_close.get(&pool.id))
            .copied()
            .unwrap_or(0.0);

        let quote_px = if pool.is_native_quote {
            1.0
        } else {
            price_by_token_pool
                .get(&(pool.quote_token_id, pool.id))
                .or_else(|| native_price_by_token.get(&pool.quote_token_id))
                .copied()
                .unwrap_or(0.0)
        };

        let tvl = quote_disp * quote_px + base_disp * base_px;
        (tvl, base_disp, quote_disp)
    }

    async fn rollup_tokens(&self, bucket: Bucket, only_token: Option<i64>) -> Result<()> {
        let client = self.db.pool.get().await?;

        // Candidate A: latest price row across native-quoted pools
        let a_rows = client
            .query(
                r#"
                SELECT DISTINCT ON (token_id) token_id, price_in_native
                FROM indexer.prices
                WHERE is_pair_native
                ORDER BY token_id, updated_at DESC
                "#,
                &[],
            )
            .await?;
        let candidate_a: FxHashMap<i64, f64> = a_rows
            .iter()
            .map(|r| (r.get::<_, i64>("token_id"), r.get::<_, f64>("price_in_native")))
            .collect();

        // Candidate B: 60-minute close average over native-quoted pools
        // where the token is base
        let b_rows = client
            .query(
                r#"
                SELECT p.base_token_id AS token_id, AVG(c.close) AS avg_close
                FROM indexer.ohlcv_1m c
                JOIN indexer.pools p ON p.id = c.pool_id
                WHERE p.is_native_quote
                  AND c.bucket_start >= NOW() - make_interval(mins => 60)
                GROUP BY p.base_token_id
                "#,
                &[],
            )
            .await?;
        let candidate_b: FxHashMap<i64, f64> = b_rows
            .iter()
            .map(|r| (r.get::<_, i64>("token_id"), r.get::<_, f64>("avg_close")))
            .collect();

        // Holder counts straight from the holders table
        let holder_rows = client
            .query(
                r#"
                SELECT token_id, COUNT(*) AS holders
                FROM indexer.holders
                WHERE balance_base <> '0'
                GROUP BY token_id
                "#,
                &[],
            )
            .await?;
        let holder_counts: FxHashMap<i64, i64> = holder_rows
            .iter()
            .map(|r| (r.get::<_, i64>("token_id"), r.get::<_, i64>("holders")))
            .collect();

        let token_rows = client
            .query(
                r#"
                SELECT id, exponent, max_supply_base, total_supply_base
                FROM indexer.tokens
                WHERE $1::bigint IS NULL OR id = $1
                "#,
                &[&only_token],
            )
            .await?;

        let now = Utc::now();
        let rows: Vec<TokenMatrixRow> = token_rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let exponent: Option<i16> = row.get("exponent");
                let max_supply: Option<String> = row.get("max_supply_base");
                let total_supply: Option<String> = row.get("total_supply_base");

                let price = resolve_token_price(
                    candidate_a.get(&id).copied(),
                    candidate_b.get(&id).copied(),
                    exponent,
                    self.scale_heuristic,
                );

                let circulating_disp = total_supply
                    .as_deref()
                    .map(|s| display_amount(s, exponent))
                    .unwrap_or(0.0);
                let max_disp = max_supply
                    .as_deref()
                    .map(|s| display_amount(s, exponent))
                    .unwrap_or(0.0);

                TokenMatrixRow {
                    token_id: id,
                    bucket,
                    price_native: price,
                    market_cap_native: circulating_disp * price,
                    fdv_native: max_disp * price,
                    holders: holder_counts.get(&id).copied().unwrap_or(0),
                    updated_at: now,
                }
            })
            .collect();

        if rows.is_empty() {
            return Ok(());
        }

        let token_ids: Vec<i64> = rows.iter().map(|r| r.token_id).collect();
        let prices: Vec<f64> = rows.iter().map(|r| r.price_native).collect();
        let market_caps: Vec<f64> = rows.iter().map(|r| r.market_cap_native).collect();
        let fdvs: Vec<f64> = rows.iter().map(|r| r.fdv_native).collect();
        let holders: Vec<i64> = rows.iter().map(|r| r.holders).collect();

        let bucket_label = bucket.label();
        client
            .execute(
                r#"
                INSERT INTO indexer.token_matrix (
                    token_id, bucket, price_native, market_cap_native, fdv_native,
                    holders, updated_at
                )
                SELECT d.token_id, $6::text, d.price_native, d.market_cap_native,
                       d.fdv_native, d.holders, $7::timestamptz
                FROM UNNEST(
                    $1::bigint[], $2::float8[], $3::float8[], $4::float8[], $5::bigint[]
                ) AS d(token_id, price_native, market_cap_native, fdv_native, holders)
                ON CONFLICT (token_id, bucket) DO UPDATE SET
                    price_native = EXCLUDED.price_native,
                    market_cap_native = EXCLUDED.market_cap_native,
                    fdv_native = EXCLUDED.fdv_native,
                    holders = EXCLUDED.holders,
                    updated_at = EXCLUDED.updated_at
                "#,
                &[
                    &token_ids,
                    &prices,
                    &market_caps,
                    &fdvs,
                    &holders,
                    &bucket_label,
                    &now,
                ],
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_prefers_a_then_b() {
        assert_eq!(resolve_token_price(Some(0.5), Some(0.4), Some(6), true), 0.5);
        assert_eq!(resolve_token_price(None, Some(0.4), Some(6), true), 0.4);
        assert_eq!(resolve_token_price(None, None, Some(6), true), 0.0);
    }

    #[test]
    fn base_denominated_leakage_is_rescaled() {
        // A is 1e6 times B for an exponent-6 token: salvage as A / 1e6.
        let price = resolve_token_price(Some(2000.0), Some(0.002), Some(6), true);
        assert!((price - 0.002).abs() < 1e-12);
    }

    #[test]
    fn heuristic_requires_exponent_six_and_toggle() {
        // Wrong exponent: A wins untouched.
        assert_eq!(
            resolve_token_price(Some(2000.0), Some(0.002), Some(8), true),
            2000.0
        );
        // Toggle off: A wins untouched.
        assert_eq!(
            resolve_token_price(Some(2000.0), Some(0.002), Some(6), false),
            2000.0
        );
        // Ratio outside the window: A wins untouched.
        assert_eq!(
            resolve_token_price(Some(20.0), Some(0.002), Some(6), true),
            20.0
        );
    }
}

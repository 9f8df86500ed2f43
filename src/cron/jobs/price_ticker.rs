//! Price-from-reserves ticker.
//!
//! Independent loop over native-quoted pools that recomputes each pool's
//! mid price straight from LCD reserves. Reserve reads go through a short
//! TTL cache with in-flight coalescing so concurrent tickers (and the
//! block path) never stampede the same pair contract.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use log::warn;
use tokio::sync::Mutex;

use crate::chain::ChainClient;
use crate::db::models::{Pool, PriceUpdate};
use crate::db::PostgresClient;
use crate::utils::{FlightGroup, FlightRole, TtlCache};
use crate::worker::parser;
use crate::worker::processor::price_from_reserves;

/// Reserve cache TTL; the ticker runs every few seconds and the block path
/// shares the same data shape, so ~2s of staleness is acceptable.
const RESERVES_TTL: Duration = Duration::from_millis(2000);
const RESERVES_CACHE_MAX: usize = 4096;

pub struct PriceTicker {
    chain: Arc<ChainClient>,
    db: Arc<PostgresClient>,
    reserves_cache: Mutex<TtlCache<String, (String, String)>>,
    flights: Arc<FlightGroup>,
    concurrency: usize,
}

impl PriceTicker {
    pub fn new(chain: Arc<ChainClient>, db: Arc<PostgresClient>, concurrency: usize) -> Self {
        Self {
            chain,
            db,
            reserves_cache: Mutex::new(TtlCache::new(RESERVES_TTL, RESERVES_CACHE_MAX)),
            flights: FlightGroup::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run_cycle(&self) -> Result<()> {
        let pools = self.db.native_quoted_pools().await?;

        futures::stream::iter(pools)
            .for_each_concurrent(self.concurrency, |pool| async move {
                if let Err(e) = self.tick_pool(&pool).await {
                    warn!("Price tick for {} failed: {:#}", pool.pair_contract, e);
                }
            })
            .await;

        Ok(())
    }

    async fn tick_pool(&self, pool: &Pool) -> Result<()> {
        // Unknown base exponent: price would be mis-scaled, skip.
        let Some(base_exp) = pool.base_exponent else {
            return Ok(());
        };

        let Some((base_raw, quote_raw)) = self.fetch_reserves(pool).await else {
            return Ok(());
        };

        if let Some(price) = price_from_reserves(&base_raw, &quote_raw, base_exp.max(0) as u32) {
            self.db
                .upsert_price(&PriceUpdate {
                    token_id: pool.base_token_id,
                    pool_id: pool.id,
                    price_in_native: price,
                    is_pair_native: true,
                    updated_at: Utc::now(),
                })
                .await?;
        }

        Ok(())
    }

    /// TTL-cached, single-flight reserve read for one pair contract.
    async fn fetch_reserves(&self, pool: &Pool) -> Option<(String, String)> {
        loop {
            if let Some(cached) = self
                .reserves_cache
                .lock()
                .await
                .get(&pool.pair_contract)
            {
                return Some(cached);
            }

            match self.flights.begin(&pool.pair_contract) {
                FlightRole::Leader(guard) => {
                    let fetched = match self.chain.query_pool(&pool.pair_contract).await {
                        Ok(response) => parser::parse_pool_reserves(
                            &response,
                            &pool.base_denom,
                            &pool.quote_denom,
                        ),
                        Err(e) => {
                            warn!("Reserves query for {} failed: {:#}", pool.pair_contract, e);
                            None
                        },
                    };

                    if let Some(value) = &fetched {
                        self.reserves_cache
                            .lock()
                            .await
                            .insert(pool.pair_contract.clone(), value.clone());
                    }
                    drop(guard);
                    return fetched;
                },
                FlightRole::Follower(notify) => {
                    FlightRole::wait(notify).await;
                    // Loop back to re-read the cache the leader just filled.
                },
            }
        }
    }
}

//! Fast-track consumer for `pair_created` notifications.
//!
//! Runs a dedicated LISTEN connection and, for each new pair, seeds
//! metadata, holders, the security scan, the matrices, and the initial
//! price/candle. Every step is best-effort and independent: a failure is
//! logged and the rest still runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, NoTls};
use tokio_util::sync::CancellationToken;

use crate::chain::ChainClient;
use crate::cron::jobs::matrix_rollup::RollupEngine;
use crate::db::models::{CandleTick, PriceUpdate};
use crate::db::PostgresClient;
use crate::pubsub::{PairCreated, PAIR_CREATED_CHANNEL};
use crate::utils::floor_minute;
use crate::worker::holders::HoldersSweeper;
use crate::worker::metadata::MetadataResolver;
use crate::worker::parser;
use crate::worker::processor::price_from_reserves;
use crate::writers::WriterSet;

/// One listener per process; duplicate consumers would double-seed pairs.
static LISTENER_ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct FastTrackListener {
    db: Arc<PostgresClient>,
    chain: Arc<ChainClient>,
    resolver: Arc<MetadataResolver>,
    holders: Arc<HoldersSweeper>,
    rollup: Arc<RollupEngine>,
    writers: WriterSet,
    native_denom: String,
}

impl FastTrackListener {
    pub fn new(
        db: Arc<PostgresClient>,
        chain: Arc<ChainClient>,
        resolver: Arc<MetadataResolver>,
        holders: Arc<HoldersSweeper>,
        rollup: Arc<RollupEngine>,
        writers: WriterSet,
        native_denom: String,
    ) -> Self {
        Self {
            db,
            chain,
            resolver,
            holders,
            rollup,
            writers,
            native_denom,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        anyhow::ensure!(
            !LISTENER_ACTIVE.swap(true, Ordering::SeqCst),
            "Fast-track listener is already running in this process"
        );

        let result = self.listen_loop(cancellation_token).await;
        LISTENER_ACTIVE.store(false, Ordering::SeqCst);
        result
    }

    async fn listen_loop(&self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        loop {
            if cancellation_token.is_cancelled() {
                return Ok(());
            }

            let (client, mut connection) = tokio_postgres::connect(&self.db.conn_string, NoTls)
                .await
                .context("LISTEN connection failed")?;

            let (tx, mut rx) = mpsc::unbounded_channel();
            let conn_task = tokio::spawn(async move {
                let mut messages =
                    futures::stream::poll_fn(move |cx| connection.poll_message(cx));
                while let Some(message) = messages.next().await {
                    match message {
                        Ok(AsyncMessage::Notification(n)) => {
                            let _ = tx.send(n);
                        },
                        Ok(_) => {},
                        Err(e) => {
                            error!("LISTEN connection error: {:#}", e);
                            break;
                        },
                    }
                }
            });

            client
                .batch_execute(&format!("LISTEN {}", PAIR_CREATED_CHANNEL))
                .await
                .context("LISTEN command failed")?;
            info!("Fast-track listener subscribed to {}", PAIR_CREATED_CHANNEL);

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        conn_task.abort();
                        return Ok(());
                    },
                    notification = rx.recv() => {
                        match notification {
                            Some(n) if n.channel() == PAIR_CREATED_CHANNEL => {
                                match serde_json::from_str::<PairCreated>(n.payload()) {
                                    Ok(payload) => self.handle(payload).await,
                                    Err(e) => warn!("Bad pair_created payload: {:#}", e),
                                }
                            },
                            Some(_) => {},
                            None => break,
                        }
                    },
                }
            }

            warn!("LISTEN connection dropped, reconnecting");
            conn_task.abort();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn handle(&self, payload: PairCreated) {
        info!(
            "Fast-tracking new pair {} ({}/{})",
            payload.pair_contract, payload.base_denom, payload.quote_denom
        );

        // Metadata for both legs
        for denom in [&payload.base_denom, &payload.quote_denom] {
            if let Err(e) = self.resolver.refresh(denom).await {
                warn!("Fast-track metadata for {} failed: {:#}", denom, e);
            }
        }

        // Holders for non-native legs, one retry on an empty result
        for (denom, token_id) in [
            (&payload.base_denom, payload.base_token_id),
            (&payload.quote_denom, payload.quote_token_id),
        ] {
            if *denom == self.native_denom {
                continue;
            }
            if let Err(e) = self.refresh_holders_with_retry(token_id).await {
                warn!("Fast-track holders for {} failed: {:#}", denom, e);
            }
        }

        // Security scan for base and non-native quote
        for denom in [&payload.base_denom, &payload.quote_denom] {
            if *denom == self.native_denom {
                continue;
            }
            if let Err(e) = self.resolver.refresh_supply(denom).await {
                warn!("Fast-track security scan for {} failed: {:#}", denom, e);
            }
        }

        // Matrices across all buckets
        if let Err(e) = self.rollup.refresh_pool_matrix_once(payload.pool_id).await {
            warn!("Fast-track pool matrix for {} failed: {:#}", payload.pool_id, e);
        }
        for token_id in [payload.base_token_id, payload.quote_token_id] {
            if let Err(e) = self.rollup.refresh_token_matrix_once(token_id).await {
                warn!("Fast-track token matrix for {} failed: {:#}", token_id, e);
            }
        }

        // Initial price and candle (native-quoted pairs only)
        if payload.is_native_quote {
            if let Err(e) = self.seed_price_and_candle(&payload).await {
                warn!(
                    "Fast-track price seeding for {} failed: {:#}",
                    payload.pair_contract, e
                );
            }
        }
    }

    async fn refresh_holders_with_retry(&self, token_id: i64) -> anyhow::Result<()> {
        let Some(token) = self.db.get_token_by_id(token_id).await? else {
            return Ok(());
        };

        match self.holders.refresh_token(&token).await? {
            Some(0) => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                self.holders.refresh_token(&token).await?;
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// Deterministic initial price: the first provide-liquidity trade's
    /// reserves, falling back to live LCD reserves at pair creation time.
    async fn seed_price_and_candle(&self, payload: &PairCreated) -> anyhow::Result<()> {
        // Give the originating height's batches a moment to land; the
        // provide trade is written by the same commit that notified us.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let Some(pool) = self.db.get_pool_by_id(payload.pool_id).await? else {
            return Ok(());
        };
        if !pool.is_native_quote {
            return Ok(());
        }
        let Some(base_exp) = pool.base_exponent else {
            // Exponent unresolved; the block path will seed prices once the
            // metadata lands.
            return Ok(());
        };

        // Preferred source: the first provide-liquidity trade
        if let Some(trade) = self.db.first_provide_trade(pool.id).await? {
            if let (Some(base_raw), Some(quote_raw)) =
                (trade.reserve_base_base.as_deref(), trade.reserve_quote_base.as_deref())
            {
                if let Some(price) = price_from_reserves(base_raw, quote_raw, base_exp.max(0) as u32)
                {
                    self.write_seed(&pool.pair_contract, payload, price, trade.created_at)
                        .await?;
                    return Ok(());
                }
            }
        }

        // Fallback: live reserves at creation time
        let response = self.chain.query_pool(&pool.pair_contract).await?;
        if let Some((base_raw, quote_raw)) =
            parser::parse_pool_reserves(&response, &pool.base_denom, &pool.quote_denom)
        {
            if let Some(price) = price_from_reserves(&base_raw, &quote_raw, base_exp.max(0) as u32)
            {
                let at = pool.created_at.unwrap_or_else(Utc::now);
                self.write_seed(&pool.pair_contract, payload, price, at).await?;
            }
        }

        Ok(())
    }

    async fn write_seed(
        &self,
        pair_contract: &str,
        payload: &PairCreated,
        price: f64,
        at: chrono::DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.db
            .upsert_price(&PriceUpdate {
                token_id: payload.base_token_id,
                pool_id: payload.pool_id,
                price_in_native: price,
                is_pair_native: true,
                updated_at: Utc::now(),
            })
            .await?;

        // Zero-volume candle so charts have an origin point
        self.writers
            .candles
            .enqueue(CandleTick {
                pool_id: payload.pool_id,
                bucket_start: floor_minute(at),
                price,
                volume_native: 0.0,
                trade_count: 0,
                liquidity_native: None,
            })
            .await?;
        self.writers.candles.drain().await?;

        info!(
            "Seeded initial price {} for pair {}",
            price, pair_contract
        );
        Ok(())
    }
}

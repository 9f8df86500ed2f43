//! Cron scheduler for periodic background tasks.
//!
//! Runs the matrix rollups, holder sweeps, price-from-reserves ticker, FX
//! fetcher, partition maintenance, and metadata backfill on their
//! configured intervals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::JobSettings;
use crate::cron::jobs;
use crate::cron::jobs::fx::FxFetcher;
use crate::cron::jobs::matrix_rollup::RollupEngine;
use crate::cron::jobs::price_ticker::PriceTicker;
use crate::db::PostgresClient;
use crate::worker::{HoldersSweeper, MetadataResolver};

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    db: Arc<PostgresClient>,
    rollup: Arc<RollupEngine>,
    holders: Arc<HoldersSweeper>,
    ticker: Arc<PriceTicker>,
    fx: Arc<FxFetcher>,
    resolver: Arc<MetadataResolver>,
    settings: Arc<JobSettings>,
}

impl CronScheduler {
    pub fn new(
        db: Arc<PostgresClient>,
        rollup: Arc<RollupEngine>,
        holders: Arc<HoldersSweeper>,
        ticker: Arc<PriceTicker>,
        fx: Arc<FxFetcher>,
        resolver: Arc<MetadataResolver>,
        settings: JobSettings,
    ) -> Self {
        Self {
            db,
            rollup,
            holders,
            ticker,
            fx,
            resolver,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;
        let mut job_count = 0;

        // Matrix rollups
        {
            let rollup = self.rollup.clone();
            let interval = self.settings.matrix_rollup_sec;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let rollup = rollup.clone();
                        Box::pin(async move {
                            if let Err(e) = rollup.run().await {
                                error!("Matrix rollup failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered matrix_rollup job (every {}s)", interval);
            job_count += 1;
        }

        // Holder sweeps
        {
            let holders = self.holders.clone();
            let interval = self.settings.holders_refresh_sec;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let holders = holders.clone();
                        Box::pin(async move {
                            if let Err(e) = holders.run_cycle().await {
                                error!("Holder sweep failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered holders job (every {}s)", interval);
            job_count += 1;
        }

        // Price-from-reserves ticker
        {
            let ticker = self.ticker.clone();
            let interval = self.settings.price_sim_sec;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let ticker = ticker.clone();
                        Box::pin(async move {
                            if let Err(e) = ticker.run_cycle().await {
                                error!("Price ticker failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered price_ticker job (every {}s)", interval);
            job_count += 1;
        }

        // FX fetcher
        {
            let fx = self.fx.clone();
            let interval = self.settings.fx_sec;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let fx = fx.clone();
                        Box::pin(async move {
                            if let Err(e) = fx.run_cycle().await {
                                error!("FX fetch failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered fx job (every {}s)", interval);
            job_count += 1;
        }

        // Partition maintenance
        {
            let db = self.db.clone();
            let interval = self.settings.partitions_sec;
            let months_ahead = self.settings.partition_months_ahead;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let db = db.clone();
                        Box::pin(async move {
                            if let Err(e) = jobs::partitions::run(&db, months_ahead).await {
                                error!("Partition maintenance failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered partitions job (every {}s)", interval);
            job_count += 1;
        }

        // Metadata backfill
        {
            let db = self.db.clone();
            let resolver = self.resolver.clone();
            let settings = self.settings.clone();
            let interval = self.settings.meta_refresh_sec;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let db = db.clone();
                        let resolver = resolver.clone();
                        let settings = settings.clone();
                        Box::pin(async move {
                            if let Err(e) =
                                jobs::meta_backfill::run(&db, &resolver, &settings).await
                            {
                                error!("Metadata backfill failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered meta_backfill job (every {}s)", interval);
            job_count += 1;
        }

        // Registry poll (only when the registry is enabled)
        if self.settings.use_chain_registry {
            let db = self.db.clone();
            let resolver = self.resolver.clone();
            let settings = self.settings.clone();
            let interval = self.settings.registry_poll_sec;
            scheduler
                .add(Job::new_repeated_async(
                    Duration::from_secs(interval),
                    move |_uuid, _lock| {
                        let db = db.clone();
                        let resolver = resolver.clone();
                        let settings = settings.clone();
                        Box::pin(async move {
                            if let Err(e) =
                                jobs::meta_backfill::registry_poll(&db, &resolver, &settings).await
                            {
                                error!("Registry poll failed: {:#}", e);
                            }
                        })
                    },
                )?)
                .await?;
            info!("Registered registry_poll job (every {}s)", interval);
            job_count += 1;
        }

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", job_count);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }
}

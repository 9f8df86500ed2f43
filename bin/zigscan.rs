use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use zigscan::cron::jobs::fx::FxFetcher;
use zigscan::cron::jobs::matrix_rollup::RollupEngine;
use zigscan::cron::jobs::partitions;
use zigscan::cron::jobs::price_ticker::PriceTicker;
use zigscan::{
    BlockDriver, BlockProcessor, ChainClient, CronScheduler, FastTrackListener, HoldersSweeper,
    MetadataResolver, PostgresClient, Settings, Writers,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    // Load configuration from the environment
    let settings = Arc::new(
        Settings::new().context("Failed to load configuration from the environment")?,
    );

    let db = Arc::new(
        PostgresClient::new(&settings.postgres)
            .await
            .context("Failed to initialize database connection")?,
    );
    db.migrate().await?;
    db.health_check().await?;

    // Partitioned parents need children before the first insert
    partitions::run(&db, settings.jobs.partition_months_ahead).await?;

    // The native token's exponent is fixed by the chain; seed it so price
    // paths work from the very first block
    db.ensure_native_token(&settings.chain.native_denom).await?;

    let chain = Arc::new(ChainClient::new(&settings.chain)?);

    let cancellation_token = CancellationToken::new();

    // Batch writers
    let writers = Writers::spawn(db.clone(), &settings.writers);
    let writer_set = writers.set.clone();

    // Collaborators
    let resolver = Arc::new(MetadataResolver::new(
        chain.clone(),
        db.clone(),
        &settings.jobs,
    ));
    let page_semaphore = Arc::new(Semaphore::new(settings.jobs.lcd_page_concurrency.max(1)));
    let holders = Arc::new(HoldersSweeper::new(
        chain.clone(),
        db.clone(),
        page_semaphore,
        &settings.jobs,
    ));
    let rollup = Arc::new(RollupEngine::new(
        db.clone(),
        settings.jobs.price_scale_heuristic,
    ));
    let ticker = Arc::new(PriceTicker::new(
        chain.clone(),
        db.clone(),
        settings.jobs.price_job_concurrency,
    ));
    let fx = Arc::new(FxFetcher::new(
        chain.http(),
        db.clone(),
        settings.fx.clone(),
    ));

    // Fast-track listener (exactly one per process)
    let listener = FastTrackListener::new(
        db.clone(),
        chain.clone(),
        resolver.clone(),
        holders.clone(),
        rollup.clone(),
        writer_set.clone(),
        settings.chain.native_denom.clone(),
    );
    let listener_token = cancellation_token.child_token();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run(listener_token).await {
            error!("Fast-track listener failed: {:#}", e);
        }
    });

    // Block ingestion pipeline
    let processor = Arc::new(BlockProcessor::new(
        chain.clone(),
        db.clone(),
        writer_set.clone(),
        resolver.clone(),
        &settings,
    ));
    let driver = BlockDriver::new(
        chain.clone(),
        db.clone(),
        processor,
        writer_set.clone(),
        &settings.indexer,
    );
    let driver_token = cancellation_token.child_token();
    let driver_handle = tokio::spawn(async move {
        if let Err(e) = driver.run(driver_token).await {
            error!("Block driver failed: {:#}", e);
        }
    });

    info!("Block driver started");

    // Background jobs
    let cron = CronScheduler::new(
        db.clone(),
        rollup,
        holders,
        ticker,
        fx,
        resolver,
        settings.jobs.clone(),
    );
    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - background jobs will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Indexer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
    }

    // Cancel all running tasks
    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for block driver to stop...");
    let _ = driver_handle.await;

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Waiting for fast-track listener to stop...");
    let _ = listener_handle.await;

    // Final drain so nothing queued is lost
    info!("Shutting down batch writers...");
    writers.shutdown().await;

    info!("All writers stopped");
    Ok(())
}

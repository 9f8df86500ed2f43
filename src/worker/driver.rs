//! Top-level ingestion driver.
//!
//! Keeps a bounded window of heights in flight and commits strictly in
//! ascending order: a finished future height is not checkpointed until every
//! lower height has been drained and checkpointed first. Committing means
//! draining all three batch writers, then writing the checkpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use futures::stream::{FuturesOrdered, StreamExt};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::chain::ChainClient;
use crate::config::IndexerSettings;
use crate::db::models::IndexState;
use crate::db::PostgresClient;
use crate::worker::processor::BlockProcessor;
use crate::writers::WriterSet;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

pub struct BlockDriver {
    chain: Arc<ChainClient>,
    db: Arc<PostgresClient>,
    processor: Arc<BlockProcessor>,
    writers: WriterSet,
    pipeline_depth: usize,
    poll_sleep: Duration,
    max_blocks: i64,
    halt_on_error: bool,
}

impl BlockDriver {
    pub fn new(
        chain: Arc<ChainClient>,
        db: Arc<PostgresClient>,
        processor: Arc<BlockProcessor>,
        writers: WriterSet,
        settings: &IndexerSettings,
    ) -> Self {
        Self {
            chain,
            db,
            processor,
            writers,
            pipeline_depth: settings.pipeline_depth.max(1),
            poll_sleep: Duration::from_millis(settings.poll_sleep_ms),
            max_blocks: settings.max_blocks,
            halt_on_error: settings.halt_on_error,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let mut next_height = match self.db.get_index_state().await? {
            Some(state) => state.last_height as u64 + 1,
            None => {
                let tip = self
                    .chain
                    .status()
                    .await
                    .context("No checkpoint and no reachable RPC to pick a start height")?;
                info!("No checkpoint found, starting at chain tip {}", tip);
                tip
            },
        };

        info!(
            "Block driver starting at height {} (pipeline depth {})",
            next_height, self.pipeline_depth
        );

        let mut latest_known: u64 = 0;
        let mut committed: i64 = 0;
        let mut last_progress_log = Instant::now();
        let mut inflight = FuturesOrdered::new();

        loop {
            if cancellation_token.is_cancelled() {
                info!("Block driver received cancellation signal");
                break;
            }

            if inflight.is_empty() && next_height > latest_known {
                match self.chain.status().await {
                    Ok(tip) => latest_known = tip,
                    Err(e) => warn!("Status poll failed: {:#}", e),
                }
            }

            while inflight.len() < self.pipeline_depth && next_height <= latest_known {
                let processor = self.processor.clone();
                let height = next_height;
                inflight.push_back(async move { (height, processor.process_height(height).await) });
                next_height += 1;
            }

            if inflight.is_empty() {
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_sleep) => {},
                }
                continue;
            }

            let outcome = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                outcome = inflight.next() => outcome,
            };
            let Some((height, result)) = outcome else {
                continue;
            };

            if let Err(e) = result {
                error!("Processing height {} failed: {:#}", height, e);
                if self.halt_on_error {
                    self.writers.drain_all().await?;
                    return Err(anyhow::anyhow!(
                        "Halting at height {} (HALT_ON_ERROR is set)",
                        height
                    ));
                }
                // Default policy: checkpoint anyway and let the rollups
                // reconcile; the error is on record above.
            }

            self.writers
                .drain_all()
                .await
                .context("Writer drain before checkpoint failed")?;
            self.db
                .set_index_state(&IndexState::new(height as i64))
                .await
                .context("Checkpoint write failed")?;

            committed += 1;
            if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                info!("Committed height {} ({} this session)", height, committed);
                last_progress_log = Instant::now();
            }

            if self.max_blocks > 0 && committed >= self.max_blocks {
                info!("Reached MAX_BLOCKS={}, stopping driver", self.max_blocks);
                break;
            }
        }

        // Final drain so nothing enqueued is lost on the way out.
        self.writers.drain_all().await?;
        info!("Block driver stopped");
        Ok(())
    }
}

//! Batch-coalescing Postgres writers.
//!
//! High-rate per-row operations (trades, pool state, candle ticks) are
//! queued and flushed as one amortized multi-row statement. A queue flushes
//! when it reaches its size cap, when its oldest item ages past the wait
//! window, or on an explicit drain.

mod candles;
mod pool_state;
mod queue;
mod trades;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::WriterSettings;
use crate::db::models::{CandleTick, PoolStateUpdate, Trade};
use crate::db::PostgresClient;

pub use queue::BatchSender;

/// Cloneable handles for the three ingest queues.
#[derive(Clone)]
pub struct WriterSet {
    pub trades: BatchSender<Trade>,
    pub pool_state: BatchSender<PoolStateUpdate>,
    pub candles: BatchSender<CandleTick>,
}

impl WriterSet {
    /// Flush all three queues to disk. Called before every checkpoint write
    /// and on shutdown.
    pub async fn drain_all(&self) -> anyhow::Result<()> {
        self.trades.drain().await?;
        self.pool_state.drain().await?;
        self.candles.drain().await?;
        Ok(())
    }
}

/// Owns the writer tasks; `set` hands out producer handles.
pub struct Writers {
    pub set: WriterSet,
    handles: Vec<JoinHandle<()>>,
}

impl Writers {
    pub fn spawn(db: Arc<PostgresClient>, settings: &WriterSettings) -> Self {
        let trade_flusher = trades::TradeFlusher::new(db.clone());
        let (trades, trades_handle) = queue::spawn(
            "trades",
            settings.trades_batch_max,
            settings.trades_batch_wait_ms,
            move |items| {
                let flusher = trade_flusher.clone();
                async move { flusher.flush(items).await }
            },
        );

        let state_flusher = pool_state::PoolStateFlusher::new(db.clone());
        let (pool_state, state_handle) = queue::spawn(
            "pool_state",
            settings.state_batch_max,
            settings.state_batch_wait_ms,
            move |items| {
                let flusher = state_flusher.clone();
                async move { flusher.flush(items).await }
            },
        );

        let candle_flusher = candles::CandleFlusher::new(db);
        let (candles, candles_handle) = queue::spawn(
            "ohlcv",
            settings.ohlcv_batch_max,
            settings.ohlcv_batch_wait_ms,
            move |items| {
                let flusher = candle_flusher.clone();
                async move { flusher.flush(items).await }
            },
        );

        Self {
            set: WriterSet {
                trades,
                pool_state,
                candles,
            },
            handles: vec![trades_handle, state_handle, candles_handle],
        }
    }

    /// Final drain, then close the queues and wait for the tasks to exit.
    pub async fn shutdown(self) {
        let _ = self.set.drain_all().await;
        drop(self.set);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

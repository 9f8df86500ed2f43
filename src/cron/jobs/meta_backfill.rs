//! Metadata backfill and registry polling.
//!
//! Re-resolves the stalest / incomplete token metadata in bounded batches
//! so tokens discovered before their metadata existed eventually converge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use futures::StreamExt;
use log::warn;

use crate::config::JobSettings;
use crate::db::PostgresClient;
use crate::worker::MetadataResolver;

pub async fn run(
    db: &PostgresClient,
    resolver: &Arc<MetadataResolver>,
    settings: &JobSettings,
) -> Result<()> {
    if !settings.meta_backfill {
        return Ok(());
    }

    let older_than = Utc::now() - TimeDelta::seconds(settings.meta_refresh_sec as i64);
    let tokens = db
        .stale_meta_tokens(older_than, settings.meta_backfill_batch as i64)
        .await?;
    if tokens.is_empty() {
        return Ok(());
    }

    futures::stream::iter(&tokens)
        .for_each_concurrent(settings.meta_concurrency.max(1), |token| async move {
            if let Err(e) = resolver.refresh(&token.denom).await {
                warn!("Metadata backfill for {} failed: {:#}", token.denom, e);
            }
            tokio::time::sleep(Duration::from_millis(settings.meta_backfill_sleep_ms)).await;
        })
        .await;

    Ok(())
}

/// Registry poll: re-resolve a batch of tokens against the asset registry
/// regardless of completeness, stalest first.
pub async fn registry_poll(
    db: &PostgresClient,
    resolver: &Arc<MetadataResolver>,
    settings: &JobSettings,
) -> Result<()> {
    if !settings.use_chain_registry {
        return Ok(());
    }

    let tokens = db
        .stale_meta_tokens(Utc::now(), settings.registry_poll_batch as i64)
        .await?;

    for token in &tokens {
        if let Err(e) = resolver.refresh(&token.denom).await {
            warn!("Registry poll for {} failed: {:#}", token.denom, e);
        }
    }

    Ok(())
}

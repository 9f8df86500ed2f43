//! Token holder sweeps.
//!
//! Walks `denom_owners` pagination per token under a process-wide page
//! semaphore, upserts balances page by page, and finalizes by zeroing
//! addresses that disappeared and recomputing the holder count.

use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::chain::{ChainClient, HttpStatusError};
use crate::config::JobSettings;
use crate::db::models::{HolderPage, Token};
use crate::db::PostgresClient;

pub struct HoldersSweeper {
    chain: Arc<ChainClient>,
    db: Arc<PostgresClient>,
    /// Process-wide throttle for LCD page fetches, shared with any other
    /// holder refresh path.
    page_semaphore: Arc<Semaphore>,
    max_pages: usize,
    batch_size: usize,
}

/// Parse one `denom_owners` response page.
pub fn parse_owners_page(json: &Value) -> HolderPage {
    let entries = json["denom_owners"]
        .as_array()
        .map(|owners| {
            owners
                .iter()
                .filter_map(|owner| {
                    let address = owner["address"].as_str()?;
                    let amount = owner["balance"]["amount"].as_str()?;
                    Some((address.to_string(), amount.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let next_key = json["pagination"]["next_key"]
        .as_str()
        .filter(|k| !k.is_empty())
        .map(String::from);

    HolderPage { entries, next_key }
}

impl HoldersSweeper {
    pub fn new(
        chain: Arc<ChainClient>,
        db: Arc<PostgresClient>,
        page_semaphore: Arc<Semaphore>,
        settings: &JobSettings,
    ) -> Self {
        Self {
            chain,
            db,
            page_semaphore,
            max_pages: settings.max_holder_pages_per_cycle.max(1),
            batch_size: settings.holders_batch_size.max(1),
        }
    }

    /// One sweep cycle over the stalest tokens.
    pub async fn run_cycle(&self) -> anyhow::Result<()> {
        let tokens = self.db.stalest_holder_tokens(self.batch_size as i64).await?;

        for token in &tokens {
            if let Err(e) = self.refresh_token(token).await {
                warn!("Holder sweep for {} failed: {:#}", token.denom, e);
            }
        }

        Ok(())
    }

    /// Sweep one token. Returns the resulting holder count, or None when the
    /// ownership endpoint does not support the denom (501).
    pub async fn refresh_token(&self, token: &Token) -> anyhow::Result<Option<i64>> {
        let mut seen: Vec<String> = Vec::new();
        let mut page_key: Option<String> = None;
        let mut pages = 0;
        let mut exhausted = false;

        loop {
            if pages >= self.max_pages {
                break;
            }

            let result = {
                let _permit = self.page_semaphore.acquire().await?;
                self.chain
                    .denom_owners(&token.denom, page_key.as_deref())
                    .await
            };

            let page = match result {
                Ok(json) => parse_owners_page(&json),
                Err(e) => {
                    if e.downcast_ref::<HttpStatusError>().map(|s| s.0) == Some(501) {
                        // Denom not supported by the endpoint; keep the
                        // token's place in the rotation.
                        self.db.touch_holder_stats(token.id).await?;
                        return Ok(None);
                    }
                    return Err(e);
                },
            };

            self.db.upsert_holder_page(token.id, &page.entries).await?;
            seen.extend(page.entries.into_iter().map(|(address, _)| address));
            pages += 1;

            match page.next_key {
                Some(key) => page_key = Some(key),
                None => {
                    exhausted = true;
                    break;
                },
            }
        }

        // Zeroing unseen balances is only sound when the sweep saw every
        // page; a truncated sweep must not wipe holders past the page cap.
        let count = if exhausted {
            self.db.finalize_holders(token.id, &seen).await?
        } else {
            info!(
                "Holder sweep for {} truncated at {} pages",
                token.denom, pages
            );
            self.db.touch_holder_stats(token.id).await?;
            seen.len() as i64
        };

        Ok(Some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_page_extracts_balances_and_key() {
        let json = serde_json::json!({
            "denom_owners": [
                {"address": "zig1aaa", "balance": {"denom": "utkn", "amount": "120"}},
                {"address": "zig1bbb", "balance": {"denom": "utkn", "amount": "50"}}
            ],
            "pagination": {"next_key": "AbCd=="}
        });

        let page = parse_owners_page(&json);
        assert_eq!(
            page.entries,
            vec![
                ("zig1aaa".to_string(), "120".to_string()),
                ("zig1bbb".to_string(), "50".to_string())
            ]
        );
        assert_eq!(page.next_key.as_deref(), Some("AbCd=="));
    }

    #[test]
    fn owners_page_last_page_has_no_key() {
        let json = serde_json::json!({
            "denom_owners": [],
            "pagination": {"next_key": null}
        });
        let page = parse_owners_page(&json);
        assert!(page.entries.is_empty());
        assert!(page.next_key.is_none());
    }
}

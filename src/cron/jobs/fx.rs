//! External USD rate fetcher.
//!
//! Pulls the configured CoinMarketCap quote and upserts one row per minute;
//! a second fetch in the same minute overwrites the first.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, warn};

use crate::config::FxSettings;
use crate::db::models::FxRate;
use crate::db::PostgresClient;
use crate::utils::floor_minute;

const QUOTE_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";
const MAX_ATTEMPTS: u32 = 4;
const BACKOFF_BASE_MS: u64 = 1500;
const BACKOFF_CAP_MS: u64 = 15_000;

pub struct FxFetcher {
    http: reqwest::Client,
    db: Arc<PostgresClient>,
    settings: FxSettings,
}

impl FxFetcher {
    pub fn new(http: reqwest::Client, db: Arc<PostgresClient>, settings: FxSettings) -> Self {
        Self { http, db, settings }
    }

    pub async fn run_cycle(&self) -> Result<()> {
        let Some(api_key) = self.settings.cmc_api_key.as_deref() else {
            debug!("CMC_API_KEY not set, skipping FX fetch");
            return Ok(());
        };

        let url = format!(
            "{}?symbol={}&convert={}",
            QUOTE_URL, self.settings.cmc_symbol, self.settings.cmc_convert
        );

        for attempt in 0..MAX_ATTEMPTS {
            let response = self
                .http
                .get(&url)
                .header("X-CMC_PRO_API_KEY", api_key)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == 429 || status >= 500 {
                        warn!("FX provider returned {}, retrying", status);
                    } else if status >= 400 {
                        return Err(anyhow::anyhow!("FX provider returned {}", status));
                    } else {
                        let json: serde_json::Value =
                            resp.json().await.context("Malformed FX response")?;
                        let price = json["data"][&self.settings.cmc_symbol]["quote"]
                            [&self.settings.cmc_convert]["price"]
                            .as_f64()
                            .context("Missing price in FX response")?;

                        self.db
                            .upsert_fx_rate(&FxRate {
                                ts: floor_minute(Utc::now()),
                                native_per_usd: price,
                            })
                            .await?;
                        return Ok(());
                    }
                },
                Err(e) => warn!("FX fetch failed: {:#}", e),
            }

            let delay = (BACKOFF_BASE_MS * 2_u64.pow(attempt)).min(BACKOFF_CAP_MS);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Err(anyhow::anyhow!(
            "FX fetch exhausted {} attempts",
            MAX_ATTEMPTS
        ))
    }
}

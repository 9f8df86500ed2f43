use std::sync::Arc;

use log::error;
use serde::{Deserialize, Serialize};

use crate::db::PostgresClient;
use crate::utils::valid_channel_name;

/// Channel carrying pair-creation payloads.
pub const PAIR_CREATED_CHANNEL: &str = "pair_created";

/// Payload published on `pair_created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCreated {
    pub pool_id: i64,
    pub pair_contract: String,
    pub base_denom: String,
    pub quote_denom: String,
    pub base_token_id: i64,
    pub quote_token_id: i64,
    pub is_native_quote: bool,
}

/// NOTIFY publisher.
///
/// Channel names cannot be parameterized in the NOTIFY grammar, so they are
/// validated against `^[a-z_][a-z0-9_]*$` before being interpolated; the
/// payload goes through `pg_notify` as a proper parameter.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<PostgresClient>,
}

impl Notifier {
    pub fn new(db: Arc<PostgresClient>) -> Self {
        Self { db }
    }

    pub async fn notify<T: Serialize>(&self, channel: &str, payload: &T) -> anyhow::Result<()> {
        anyhow::ensure!(
            valid_channel_name(channel),
            "Invalid NOTIFY channel name: {:?}",
            channel
        );

        let payload = serde_json::to_string(payload)?;
        let client = self.db.pool.get().await?;
        client
            .execute("SELECT pg_notify($1, $2)", &[&channel, &payload])
            .await
            .map_err(|e| {
                error!("Failed to notify {}: {:?}", channel, e);
                e
            })?;

        Ok(())
    }

    pub async fn pair_created(&self, payload: &PairCreated) -> anyhow::Result<()> {
        self.notify(PAIR_CREATED_CHANNEL, payload).await
    }
}

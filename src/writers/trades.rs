use std::sync::Arc;

use log::error;

use crate::db::models::Trade;
use crate::db::PostgresClient;

const COLS_PER_ROW: usize = 15;
const CHUNK_SIZE: usize = 200;

/// Multi-row trade inserts. Replays of the same natural key
/// `(created_at, tx_hash, pool_id, msg_index)` are silently dropped.
#[derive(Clone)]
pub struct TradeFlusher {
    db: Arc<PostgresClient>,
}

impl TradeFlusher {
    pub fn new(db: Arc<PostgresClient>) -> Self {
        Self { db }
    }

    pub async fn flush(&self, items: Vec<Trade>) -> anyhow::Result<()> {
        let client = self.db.pool.get().await?;

        for chunk in items.chunks(CHUNK_SIZE) {
            let values_clauses: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let start = i * COLS_PER_ROW + 1;
                    let placeholders: Vec<String> = (start..start + COLS_PER_ROW)
                        .map(|n| format!("${}", n))
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO indexer.trades (
                    created_at, tx_hash, pool_id, msg_index, action, direction,
                    offer_denom, offer_amount_base, ask_denom, return_amount_base,
                    reserve_base_base, reserve_quote_base, height, signer, is_router
                ) VALUES {}
                ON CONFLICT (created_at, tx_hash, pool_id, msg_index) DO NOTHING
                "#,
                values_clauses.join(", ")
            );

            // Buffers for values not directly referenceable as ToSql
            let actions: Vec<&'static str> = chunk.iter().map(|t| t.action.as_str()).collect();
            let directions: Vec<&'static str> =
                chunk.iter().map(|t| t.direction.as_str()).collect();

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, trade) in chunk.iter().enumerate() {
                params.push(&trade.created_at);
                params.push(&trade.tx_hash);
                params.push(&trade.pool_id);
                params.push(&trade.msg_index);
                params.push(&actions[i]);
                params.push(&directions[i]);
                params.push(&trade.offer_denom);
                params.push(&trade.offer_amount_base);
                params.push(&trade.ask_denom);
                params.push(&trade.return_amount_base);
                params.push(&trade.reserve_base_base);
                params.push(&trade.reserve_quote_base);
                params.push(&trade.height);
                params.push(&trade.signer);
                params.push(&trade.is_router);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} trades: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }
}

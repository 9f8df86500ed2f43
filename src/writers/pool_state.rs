use std::sync::Arc;

use log::error;
use rustc_hash::FxHashMap;

use crate::db::models::PoolStateUpdate;
use crate::db::PostgresClient;

/// Pool state upserts. A batch is deduplicated by pool keeping the LAST
/// update in enqueue order, so one statement never touches the same row
/// twice (Postgres rejects a second ON CONFLICT hit within one command).
#[derive(Clone)]
pub struct PoolStateFlusher {
    db: Arc<PostgresClient>,
}

impl PoolStateFlusher {
    pub fn new(db: Arc<PostgresClient>) -> Self {
        Self { db }
    }
}

/// Last-wins dedupe preserving nothing but the final update per pool.
pub fn dedupe_last_wins(items: Vec<PoolStateUpdate>) -> Vec<PoolStateUpdate> {
    let mut latest: FxHashMap<i64, PoolStateUpdate> = FxHashMap::default();
    for item in items {
        latest.insert(item.pool_id, item);
    }
    latest.into_values().collect()
}

impl PoolStateFlusher {
    pub async fn flush(&self, items: Vec<PoolStateUpdate>) -> anyhow::Result<()> {
        let updates = dedupe_last_wins(items);
        if updates.is_empty() {
            return Ok(());
        }

        let client = self.db.pool.get().await?;

        let pool_ids: Vec<i64> = updates.iter().map(|u| u.pool_id).collect();
        let reserve_base: Vec<&str> =
            updates.iter().map(|u| u.reserve_base_base.as_str()).collect();
        let reserve_quote: Vec<&str> =
            updates.iter().map(|u| u.reserve_quote_base.as_str()).collect();
        let updated_at: Vec<chrono::DateTime<chrono::Utc>> =
            updates.iter().map(|u| u.updated_at).collect();

        let query = r#"
            INSERT INTO indexer.pool_state (pool_id, reserve_base_base, reserve_quote_base, updated_at)
            SELECT * FROM UNNEST($1::bigint[], $2::text[], $3::text[], $4::timestamptz[])
            ON CONFLICT (pool_id) DO UPDATE SET
                reserve_base_base = EXCLUDED.reserve_base_base,
                reserve_quote_base = EXCLUDED.reserve_quote_base,
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(query, &[&pool_ids, &reserve_base, &reserve_quote, &updated_at])
            .await
            .map_err(|e| {
                error!(
                    "Failed to batch upsert {} pool states: {:?}",
                    updates.len(),
                    e
                );
                e
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn update(pool_id: i64, base: &str) -> PoolStateUpdate {
        PoolStateUpdate {
            pool_id,
            reserve_base_base: base.to_string(),
            reserve_quote_base: "1".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dedupe_keeps_last_per_pool() {
        let deduped = dedupe_last_wins(vec![
            update(1, "100"),
            update(2, "200"),
            update(1, "150"),
        ]);

        assert_eq!(deduped.len(), 2);
        let p1 = deduped.iter().find(|u| u.pool_id == 1).unwrap();
        assert_eq!(p1.reserve_base_base, "150");
    }
}

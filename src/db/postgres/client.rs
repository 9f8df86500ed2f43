use std::str::FromStr;

use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

/// Split a schema file into statements on semicolons, skipping blanks and
/// line comments.
fn split_sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|stmt| {
            stmt.lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// PostgreSQL client with connection pooling.
///
/// The single relational store for the indexer: tokens, pools, trades,
/// candles, matrices, holders, checkpoints. Uses `deadpool-postgres` for
/// connection management; every session gets the statement and
/// idle-in-transaction timeouts applied.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
    /// Connection string kept for the LISTEN connection, which needs a
    /// dedicated non-pooled session.
    pub conn_string: String,
}

impl PostgresClient {
    pub async fn new(settings: &PostgresSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL");

        let mut pg_config = tokio_postgres::Config::from_str(&settings.database_url)
            .context("Invalid DATABASE_URL")?;
        pg_config.options("-c statement_timeout=120s -c idle_in_transaction_session_timeout=60s");

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(settings.pool_size)
            .build()
            .context("Failed to create PostgreSQL connection pool")?;

        let mut retries = 0;
        let max_retries = 3;
        loop {
            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL");
                    return Ok(Self {
                        pool,
                        conn_string: settings.database_url.clone(),
                    });
                },
                Err(e) => {
                    retries += 1;
                    if retries >= max_retries {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to PostgreSQL after {} attempts: {}",
                            max_retries,
                            e
                        ));
                    }
                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(retries));
                    log::warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}), retrying in {:?}...",
                        retries,
                        max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Health check - verify connection is still alive
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .context("PostgreSQL health check failed")?;
        Ok(())
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running PostgreSQL migrations");
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string("schema/postgres.sql")
            .await
            .context("Failed to read schema/postgres.sql")?;

        for stmt in split_sql_statements(&schema) {
            client
                .execute(&stmt, &[])
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL schema applied successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::split_sql_statements;

    #[test]
    fn splitter_drops_blanks_and_comments() {
        let sql = "-- leading comment\nCREATE TABLE a (x INT);\n\n  \nCREATE INDEX b ON a (x);\n";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE"));
        assert!(stmts[1].starts_with("CREATE INDEX"));
    }
}

//! Monthly partition maintenance.
//!
//! Ensures a child partition exists for the current month and the next N
//! for every time-partitioned parent. Idempotent via IF NOT EXISTS.

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use log::info;

use crate::db::PostgresClient;

const PARTITIONED_TABLES: [&str; 4] =
    ["trades", "price_ticks", "ohlcv_1m", "leaderboard_traders"];

/// (year, month) advanced by `offset` months.
pub fn add_months(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let zero_based = (month - 1) + offset;
    (year + (zero_based / 12) as i32, (zero_based % 12) + 1)
}

/// UTC month range `[first-of-month, first-of-next-month)` as SQL literals.
pub fn month_bounds(year: i32, month: u32) -> (String, String) {
    let (next_year, next_month) = add_months(year, month, 1);
    (
        format!("{:04}-{:02}-01 00:00:00+00", year, month),
        format!("{:04}-{:02}-01 00:00:00+00", next_year, next_month),
    )
}

pub async fn run(db: &PostgresClient, months_ahead: u32) -> Result<()> {
    let client = db.pool.get().await?;
    let now = Utc::now();
    let mut created = 0;

    for offset in 0..=months_ahead {
        let (year, month) = add_months(now.year(), now.month(), offset);
        let (from, to) = month_bounds(year, month);

        for table in PARTITIONED_TABLES {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS indexer.{table}_{year:04}_{month:02} \
                 PARTITION OF indexer.{table} FOR VALUES FROM ('{from}') TO ('{to}')"
            );
            client
                .execute(&ddl, &[])
                .await
                .with_context(|| format!("Partition DDL failed for {}", table))?;
            created += 1;
        }
    }

    info!(
        "Partition maintenance done ({} statements, {} months ahead)",
        created, months_ahead
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_arithmetic_wraps_years() {
        assert_eq!(add_months(2024, 1, 0), (2024, 1));
        assert_eq!(add_months(2024, 11, 1), (2024, 12));
        assert_eq!(add_months(2024, 11, 2), (2025, 1));
        assert_eq!(add_months(2024, 12, 13), (2026, 1));
    }

    #[test]
    fn bounds_cover_the_whole_month() {
        let (from, to) = month_bounds(2024, 12);
        assert_eq!(from, "2024-12-01 00:00:00+00");
        assert_eq!(to, "2025-01-01 00:00:00+00");
    }
}

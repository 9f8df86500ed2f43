use chrono::{DateTime, Utc};

/// Latest raw reserves for one pool, in base units.
///
/// The state writer dedupes a batch by `pool_id` keeping the last update, so
/// enqueue order matters within one flush window.
#[derive(Debug, Clone)]
pub struct PoolStateUpdate {
    pub pool_id: i64,
    pub reserve_base_base: String,
    pub reserve_quote_base: String,
    pub updated_at: DateTime<Utc>,
}

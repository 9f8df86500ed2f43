use chrono::{DateTime, Utc};

/// Latest scalar price for a (token, pool) pair.
///
/// Price is native units per one DISPLAY unit of the base token. Exactly one
/// row per (token_id, pool_id); every upsert also appends a `price_ticks`
/// trail row.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub token_id: i64,
    pub pool_id: i64,
    pub price_in_native: f64,
    pub is_pair_native: bool,
    pub updated_at: DateTime<Utc>,
}

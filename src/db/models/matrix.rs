use chrono::{DateTime, Utc};

/// Rolling aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    M30,
    H1,
    H4,
    D1,
}

/// All buckets the rollup engine maintains, shortest first.
pub const BUCKETS: [Bucket; 4] = [Bucket::M30, Bucket::H1, Bucket::H4, Bucket::D1];

impl Bucket {
    pub fn label(&self) -> &'static str {
        match self {
            Bucket::M30 => "30m",
            Bucket::H1 => "1h",
            Bucket::H4 => "4h",
            Bucket::D1 => "24h",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Bucket::M30 => 30,
            Bucket::H1 => 60,
            Bucket::H4 => 240,
            Bucket::D1 => 1440,
        }
    }
}

/// Per-(pool, bucket) rolling volume/TVL row.
///
/// Volumes are DISPLAY units: `*_quote` in the pool's quote denom,
/// `*_native` converted through the quote token's latest native price
/// (identity for native-quoted pools).
#[derive(Debug, Clone)]
pub struct PoolMatrixRow {
    pub pool_id: i64,
    pub bucket: Bucket,
    pub vol_buy_quote: f64,
    pub vol_sell_quote: f64,
    pub vol_buy_native: f64,
    pub vol_sell_native: f64,
    pub tx_buy: i64,
    pub tx_sell: i64,
    pub traders: i64,
    pub tvl_native: f64,
    pub reserve_base_disp: f64,
    pub reserve_quote_disp: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-(token, bucket) valuation row.
#[derive(Debug, Clone)]
pub struct TokenMatrixRow {
    pub token_id: i64,
    pub bucket: Bucket,
    pub price_native: f64,
    pub market_cap_native: f64,
    pub fdv_native: f64,
    pub holders: i64,
    pub updated_at: DateTime<Utc>,
}

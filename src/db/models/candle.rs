use chrono::{DateTime, Utc};

/// A single price observation feeding the 1-minute OHLCV writer.
#[derive(Debug, Clone)]
pub struct CandleTick {
    pub pool_id: i64,
    /// Minute-floored bucket timestamp.
    pub bucket_start: DateTime<Utc>,
    pub price: f64,
    /// Quote-leg volume in native display units for this observation.
    pub volume_native: f64,
    pub trade_count: i64,
    pub liquidity_native: Option<f64>,
}

/// Aggregated per-(pool, minute) candle row as written to `ohlcv_1m`.
///
/// `open` is seeded from the previous minute's close when one exists,
/// otherwise from the first observed price in the bucket.
#[derive(Debug, Clone)]
pub struct Candle1m {
    pub pool_id: i64,
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_native: f64,
    pub trade_count: i64,
    pub liquidity_native: Option<f64>,
}

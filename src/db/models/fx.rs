use chrono::{DateTime, Utc};

/// Minute-bucketed external USD rate sample.
#[derive(Debug, Clone)]
pub struct FxRate {
    /// Minute-truncated sample timestamp; the upsert key.
    pub ts: DateTime<Utc>,
    pub native_per_usd: f64,
}

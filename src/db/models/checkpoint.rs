use chrono::{DateTime, Utc};

/// Singleton ingestion checkpoint (PostgreSQL).
///
/// `last_height` is the highest block fully committed to the datastore and
/// is monotonically non-decreasing across the process lifetime.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub last_height: i64,
    pub updated_at: DateTime<Utc>,
}

impl IndexState {
    pub fn new(last_height: i64) -> Self {
        Self {
            last_height,
            updated_at: Utc::now(),
        }
    }
}

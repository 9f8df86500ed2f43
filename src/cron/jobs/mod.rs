pub mod fx;
pub mod matrix_rollup;
pub mod meta_backfill;
pub mod partitions;
pub mod price_ticker;

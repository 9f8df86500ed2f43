use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Chain endpoint configuration.
///
/// Both RPC and LCD accept a primary and a backup entry; each entry may be a
/// comma-separated list. All calls iterate the flattened list round-robin
/// with backoff (see `chain::ChainClient`).
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_primary: String,
    #[serde(default)]
    pub rpc_backup: Option<String>,
    pub lcd_primary: String,
    #[serde(default)]
    pub lcd_backup: Option<String>,
    /// AMM factory contract; only `create_pair` events emitted by this
    /// address are indexed.
    pub factory_addr: String,
    #[serde(default)]
    pub router_addr: Option<String>,
    #[serde(default = "default_native_denom")]
    pub native_denom: String,
}

impl ChainSettings {
    pub fn rpc_endpoints(&self) -> Vec<String> {
        split_endpoints(&self.rpc_primary, self.rpc_backup.as_deref())
    }

    pub fn lcd_endpoints(&self) -> Vec<String> {
        split_endpoints(&self.lcd_primary, self.lcd_backup.as_deref())
    }
}

fn split_endpoints(primary: &str, backup: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = primary
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(backup) = backup {
        out.extend(
            backup
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
        );
    }
    out
}

fn default_native_denom() -> String {
    "uzig".to_string()
}

/// Block processor and driver knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    #[serde(default = "default_block_proc_concurrency")]
    pub block_proc_concurrency: usize,
    #[serde(default = "default_block_proc_max_tasks")]
    pub block_proc_max_tasks: usize,
    #[serde(default = "default_pipeline_depth")]
    pub pipeline_depth: usize,
    #[serde(default = "default_poll_sleep_ms")]
    pub poll_sleep_ms: u64,
    /// Stop after this many blocks; <= 0 means unbounded.
    #[serde(default)]
    pub max_blocks: i64,
    /// When true, a height whose processing failed halts the driver instead
    /// of being checkpointed (it will be retried after restart).
    #[serde(default)]
    pub halt_on_error: bool,
}

fn default_block_proc_concurrency() -> usize {
    12
}

fn default_block_proc_max_tasks() -> usize {
    5000
}

fn default_pipeline_depth() -> usize {
    3
}

fn default_poll_sleep_ms() -> u64 {
    900
}

/// Batch writer knobs. Each queue flushes at `max` items or `wait_ms` after
/// the first enqueue, whichever comes first.
#[derive(Debug, Deserialize, Clone)]
pub struct WriterSettings {
    #[serde(default = "default_trades_batch_max")]
    pub trades_batch_max: usize,
    #[serde(default = "default_batch_wait_ms")]
    pub trades_batch_wait_ms: u64,
    #[serde(default = "default_state_batch_max")]
    pub state_batch_max: usize,
    #[serde(default = "default_batch_wait_ms")]
    pub state_batch_wait_ms: u64,
    #[serde(default = "default_ohlcv_batch_max")]
    pub ohlcv_batch_max: usize,
    #[serde(default = "default_batch_wait_ms")]
    pub ohlcv_batch_wait_ms: u64,
}

fn default_trades_batch_max() -> usize {
    800
}

fn default_state_batch_max() -> usize {
    400
}

fn default_ohlcv_batch_max() -> usize {
    600
}

fn default_batch_wait_ms() -> u64 {
    120
}

/// Background job intervals and caps.
#[derive(Debug, Deserialize, Clone)]
pub struct JobSettings {
    #[serde(default = "default_matrix_rollup_sec")]
    pub matrix_rollup_sec: u64,
    #[serde(default = "default_holders_refresh_sec")]
    pub holders_refresh_sec: u64,
    #[serde(default = "default_holders_batch_size")]
    pub holders_batch_size: usize,
    #[serde(default = "default_max_holder_pages")]
    pub max_holder_pages_per_cycle: usize,
    #[serde(default = "default_lcd_page_concurrency")]
    pub lcd_page_concurrency: usize,
    #[serde(default = "default_price_sim_sec")]
    pub price_sim_sec: u64,
    #[serde(default = "default_price_job_concurrency")]
    pub price_job_concurrency: usize,
    #[serde(default = "default_fx_sec")]
    pub fx_sec: u64,
    #[serde(default = "default_partitions_sec")]
    pub partitions_sec: u64,
    #[serde(default = "default_partition_months_ahead")]
    pub partition_months_ahead: u32,
    #[serde(default = "default_meta_refresh_sec")]
    pub meta_refresh_sec: u64,
    #[serde(default = "default_meta_backfill")]
    pub meta_backfill: bool,
    #[serde(default = "default_meta_backfill_batch")]
    pub meta_backfill_batch: usize,
    #[serde(default = "default_meta_backfill_sleep_ms")]
    pub meta_backfill_sleep_ms: u64,
    #[serde(default = "default_meta_concurrency")]
    pub meta_concurrency: usize,
    #[serde(default)]
    pub use_chain_registry: bool,
    #[serde(default)]
    pub registry_url: Option<String>,
    #[serde(default = "default_registry_poll_sec")]
    pub registry_poll_sec: u64,
    #[serde(default = "default_registry_poll_batch")]
    pub registry_poll_batch: usize,
    /// Guarded base-denominated price salvage in the token matrix rollup.
    #[serde(default = "default_price_scale_heuristic")]
    pub price_scale_heuristic: bool,
}

fn default_matrix_rollup_sec() -> u64 {
    60
}

fn default_holders_refresh_sec() -> u64 {
    180
}

fn default_holders_batch_size() -> usize {
    8
}

fn default_max_holder_pages() -> usize {
    20
}

fn default_lcd_page_concurrency() -> usize {
    4
}

fn default_price_sim_sec() -> u64 {
    8
}

fn default_price_job_concurrency() -> usize {
    6
}

fn default_fx_sec() -> u64 {
    36
}

fn default_partitions_sec() -> u64 {
    1800
}

fn default_partition_months_ahead() -> u32 {
    3
}

fn default_meta_refresh_sec() -> u64 {
    600
}

fn default_meta_backfill() -> bool {
    true
}

fn default_meta_backfill_batch() -> usize {
    25
}

fn default_meta_backfill_sleep_ms() -> u64 {
    250
}

fn default_meta_concurrency() -> usize {
    3
}

fn default_registry_poll_sec() -> u64 {
    3600
}

fn default_registry_poll_batch() -> usize {
    50
}

fn default_price_scale_heuristic() -> bool {
    true
}

/// External USD rate provider (CoinMarketCap quote endpoint).
#[derive(Debug, Deserialize, Clone)]
pub struct FxSettings {
    #[serde(default)]
    pub cmc_api_key: Option<String>,
    #[serde(default = "default_cmc_symbol")]
    pub cmc_symbol: String,
    #[serde(default = "default_cmc_convert")]
    pub cmc_convert: String,
}

fn default_cmc_symbol() -> String {
    "ZIG".to_string()
}

fn default_cmc_convert() -> String {
    "USD".to_string()
}

/// PostgreSQL connection configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Root application configuration, sourced from the process environment.
///
/// All sections share the flat env namespace (`RPC_PRIMARY`, `DATABASE_URL`,
/// `TRADES_BATCH_MAX`, ...), so each section deserializes from the same
/// key/value map.
#[derive(Debug, Clone)]
pub struct Settings {
    pub chain: ChainSettings,
    pub indexer: IndexerSettings,
    pub writers: WriterSettings,
    pub jobs: JobSettings,
    pub fx: FxSettings,
    pub postgres: PostgresSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let source = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        Ok(Settings {
            chain: source.clone().try_deserialize()?,
            indexer: source.clone().try_deserialize()?,
            writers: source.clone().try_deserialize()?,
            jobs: source.clone().try_deserialize()?,
            fx: source.clone().try_deserialize()?,
            postgres: source.try_deserialize()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_split_and_trim() {
        let chain = ChainSettings {
            rpc_primary: "https://rpc-a.example.com/, https://rpc-b.example.com".to_string(),
            rpc_backup: Some("https://rpc-c.example.com".to_string()),
            lcd_primary: "https://lcd.example.com".to_string(),
            lcd_backup: None,
            factory_addr: "zig1factory".to_string(),
            router_addr: None,
            native_denom: default_native_denom(),
        };

        assert_eq!(
            chain.rpc_endpoints(),
            vec![
                "https://rpc-a.example.com",
                "https://rpc-b.example.com",
                "https://rpc-c.example.com"
            ]
        );
        assert_eq!(chain.lcd_endpoints(), vec!["https://lcd.example.com"]);
    }
}

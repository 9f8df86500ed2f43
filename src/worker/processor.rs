//! Per-height block processing.
//!
//! Each height runs in phases: pool creations first (so same-tx liquidity
//! finds its pool), then a cached prefetch of every touched pool, then the
//! swap/liquidity core tasks in a bounded fan-out, and finally low-priority
//! metadata refreshes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::warn;
use moka::sync::Cache;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::chain::ChainClient;
use crate::config::Settings;
use crate::db::models::{
    CandleTick, PairType, Pool, PoolStateUpdate, PriceUpdate, Trade, TradeAction, TradeDirection,
};
use crate::db::PostgresClient;
use crate::pubsub::{Notifier, PairCreated};
use crate::utils::{base_str_to_display, floor_minute, validate_price};
use crate::worker::metadata::MetadataResolver;
use crate::worker::parser::{self, EventView};
use crate::writers::WriterSet;

/// Exponent of the native denom, fixed by the chain.
pub const NATIVE_EXPONENT: u32 = 6;

#[derive(Debug, Clone)]
pub struct PoolCreation {
    pub pair: String,
    pub pair_type: PairType,
    pub lp_denom: Option<String>,
    pub pool_addr: String,
    pub tx_hash: String,
    pub msg_index: i32,
    pub signer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreKind {
    Swap,
    Provide,
    Withdraw,
}

#[derive(Debug, Clone)]
pub struct CoreTask {
    pub kind: CoreKind,
    pub pair_contract: String,
    pub attrs: FxHashMap<String, String>,
    pub tx_hash: String,
    pub msg_index: i32,
    pub signer: Option<String>,
}

#[derive(Debug, Default)]
pub struct TxScan {
    pub creations: Vec<PoolCreation>,
    pub tasks: Vec<CoreTask>,
}

/// Events for wasm action `name`, plus events typed `name` directly (node
/// versions differ in how they surface contract events).
fn collect<'a>(events: &'a [EventView], name: &str) -> Vec<&'a EventView> {
    let mut out = parser::by_type(events, name);
    out.extend(parser::wasm_by_action(events, name));
    out
}

/// Single scan over one tx's events.
///
/// `create_pair` is only honored when emitted by the configured factory.
/// The pool address comes from the paired `register.pair_contract_addr`
/// when present, else the last `instantiate._contract_address` in the tx.
pub fn scan_tx(events: &[EventView], tx_hash: &str, factory_addr: &str) -> TxScan {
    let senders = parser::msg_sender_by_index(events);
    let mut scan = TxScan::default();

    let registers = collect(events, "register");
    let last_instantiate = parser::by_type(events, "instantiate")
        .last()
        .and_then(|e| e.contract_address())
        .map(|s| s.to_string());

    for (i, event) in collect(events, "create_pair").into_iter().enumerate() {
        if event.contract_address() != Some(factory_addr) {
            continue;
        }
        let Some(pair) = event.attr("pair") else {
            continue;
        };

        let pool_addr = registers
            .get(i)
            .and_then(|r| r.attr("pair_contract_addr"))
            .map(|s| s.to_string())
            .or_else(|| last_instantiate.clone());

        let Some(pool_addr) = pool_addr else {
            warn!("create_pair {} without register/instantiate address", pair);
            continue;
        };

        let msg_index = event.msg_index();
        scan.creations.push(PoolCreation {
            pair: pair.to_string(),
            pair_type: event
                .attr("pair_type")
                .map(PairType::from_str)
                .unwrap_or(PairType::Xyk),
            lp_denom: event.attr("lp_denom").map(|s| s.to_string()),
            pool_addr,
            tx_hash: tx_hash.to_string(),
            msg_index,
            signer: senders.get(&msg_index).cloned().or_else(|| senders.get(&0).cloned()),
        });
    }

    for (kind, name) in [
        (CoreKind::Swap, "swap"),
        (CoreKind::Provide, "provide_liquidity"),
        (CoreKind::Withdraw, "withdraw_liquidity"),
    ] {
        for event in collect(events, name) {
            let Some(contract) = event.contract_address() else {
                continue;
            };
            let msg_index = event.msg_index();
            scan.tasks.push(CoreTask {
                kind,
                pair_contract: contract.to_string(),
                attrs: event.attrs.clone(),
                tx_hash: tx_hash.to_string(),
                msg_index,
                signer: senders.get(&msg_index).cloned().or_else(|| senders.get(&0).cloned()),
            });
        }
    }

    scan
}

/// Processes single heights against the datastore and writers.
pub struct BlockProcessor {
    chain: Arc<ChainClient>,
    db: Arc<PostgresClient>,
    writers: WriterSet,
    notifier: Notifier,
    resolver: Arc<MetadataResolver>,
    /// Process-wide pair_contract -> pool cache, populated by Phase 1 and
    /// the prefetch.
    pool_cache: Cache<String, Arc<Pool>>,
    /// Denoms already refreshed this session (Phase 3 skip set).
    meta_fetched: Cache<String, ()>,
    native_denom: String,
    factory_addr: String,
    router_addr: Option<String>,
    concurrency: usize,
    max_pending_tasks: usize,
    meta_concurrency: usize,
}

impl BlockProcessor {
    pub fn new(
        chain: Arc<ChainClient>,
        db: Arc<PostgresClient>,
        writers: WriterSet,
        resolver: Arc<MetadataResolver>,
        settings: &Settings,
    ) -> Self {
        Self {
            chain,
            db: db.clone(),
            writers,
            notifier: Notifier::new(db),
            resolver,
            pool_cache: Cache::new(100_000),
            meta_fetched: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(Duration::from_secs(settings.jobs.meta_refresh_sec))
                .build(),
            native_denom: settings.chain.native_denom.clone(),
            factory_addr: settings.chain.factory_addr.clone(),
            router_addr: settings.chain.router_addr.clone(),
            concurrency: settings.indexer.block_proc_concurrency,
            max_pending_tasks: settings.indexer.block_proc_max_tasks.max(1),
            meta_concurrency: settings.jobs.meta_concurrency.max(1),
        }
    }

    pub async fn process_height(&self, height: u64) -> anyhow::Result<()> {
        let (block, block_results) = tokio::try_join!(
            self.chain.block(height),
            self.chain.block_results(height)
        )
        .with_context(|| format!("Failed to fetch height {}", height))?;

        let block_time = block["result"]["block"]["header"]["time"]
            .as_str()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("Missing block time at height {}", height))?;

        let txs: Vec<&str> = block["result"]["block"]["data"]["txs"]
            .as_array()
            .map(|a| a.iter().filter_map(|t| t.as_str()).collect())
            .unwrap_or_default();

        let empty: Vec<Value> = Vec::new();
        let txs_results = block_results["result"]["txs_results"]
            .as_array()
            .unwrap_or(&empty);

        // Single scan per tx
        let mut creations: Vec<PoolCreation> = Vec::new();
        let mut tasks: Vec<CoreTask> = Vec::new();

        for (i, tx_result) in txs_results.iter().enumerate() {
            if tx_result["code"].as_i64().unwrap_or(0) != 0 {
                continue;
            }
            let Some(raw_tx) = txs.get(i) else {
                continue;
            };
            let tx_hash = match parser::tx_hash(raw_tx) {
                Ok(h) => h,
                Err(e) => {
                    warn!("Skipping tx {} at height {}: {:#}", i, height, e);
                    continue;
                },
            };

            let events = parser::events_from_tx(tx_result);
            let scan = scan_tx(&events, &tx_hash, &self.factory_addr);
            creations.extend(scan.creations);
            tasks.extend(scan.tasks);
        }

        // Phase 1: pools must exist before any same-tx liquidity touches them
        for creation in &creations {
            if let Err(e) = self.create_pool(creation, block_time, height).await {
                warn!(
                    "Failed to create pool {} at height {}: {:#}",
                    creation.pool_addr, height, e
                );
            }
        }

        // Phase 1.5: prefetch uncached pool rows for everything touched below
        let mut missing: Vec<String> = tasks
            .iter()
            .map(|t| t.pair_contract.clone())
            .filter(|c| self.pool_cache.get(c).is_none())
            .collect();
        missing.sort();
        missing.dedup();

        if !missing.is_empty() {
            match self.db.get_pools_by_contracts(&missing).await {
                Ok(pools) => {
                    for pool in pools {
                        self.pool_cache
                            .insert(pool.pair_contract.clone(), Arc::new(pool));
                    }
                },
                Err(e) => warn!("Failed to prefetch pools: {:#}", e),
            }
        }

        // Phase 2: core tasks in a bounded fan-out; interim drain when a
        // height exceeds the pending-task cap
        let chunks: Vec<&[CoreTask]> = tasks.chunks(self.max_pending_tasks).collect();
        let last_chunk = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            futures::stream::iter(chunk)
                .for_each_concurrent(self.concurrency, |task| async move {
                    if let Err(e) = self.run_core_task(task, block_time, height).await {
                        warn!(
                            "Core task {} ({}) at height {} failed: {:#}",
                            task.tx_hash, task.pair_contract, height, e
                        );
                    }
                })
                .await;

            if i < last_chunk {
                self.writers.drain_all().await?;
            }
        }

        // Phase 3: low-priority metadata for denoms first seen here
        let mut denoms: Vec<String> = Vec::new();
        for task in &tasks {
            if let Some(pool) = self.pool_cache.get(&task.pair_contract) {
                denoms.push(pool.base_denom.clone());
                denoms.push(pool.quote_denom.clone());
            }
        }
        for creation in &creations {
            if let Some((base, quote)) = parser::parse_pair(&creation.pair, &self.native_denom) {
                denoms.push(base);
                denoms.push(quote);
            }
        }
        denoms.sort();
        denoms.dedup();
        denoms.retain(|d| self.meta_fetched.get(d).is_none());

        futures::stream::iter(&denoms)
            .for_each_concurrent(self.meta_concurrency, |denom| async move {
                if let Err(e) = self.resolver.refresh(denom).await {
                    warn!("Metadata refresh for {} failed: {:#}", denom, e);
                }
                self.meta_fetched.insert(denom.clone(), ());
            })
            .await;

        Ok(())
    }

    async fn create_pool(
        &self,
        creation: &PoolCreation,
        block_time: DateTime<Utc>,
        height: u64,
    ) -> anyhow::Result<()> {
        let (base_denom, quote_denom) = parser::parse_pair(&creation.pair, &self.native_denom)
            .with_context(|| format!("Unparseable pair string {:?}", creation.pair))?;

        let base_token = self.db.ensure_token(&base_denom).await?;
        let quote_token = self.db.ensure_token(&quote_denom).await?;

        let pool = Pool {
            id: 0,
            pair_contract: creation.pool_addr.clone(),
            base_token_id: base_token.id,
            quote_token_id: quote_token.id,
            base_denom: base_denom.clone(),
            quote_denom: quote_denom.clone(),
            lp_denom: creation.lp_denom.clone(),
            pair_type: creation.pair_type,
            is_native_quote: quote_denom == self.native_denom,
            factory_addr: Some(self.factory_addr.clone()),
            router_addr: self.router_addr.clone(),
            created_height: Some(height as i64),
            created_tx: Some(creation.tx_hash.clone()),
            created_signer: creation.signer.clone(),
            created_at: Some(block_time),
            base_exponent: base_token.exponent,
            quote_exponent: quote_token.exponent,
        };

        let stored = self.db.upsert_pool(&pool).await?;
        self.pool_cache
            .insert(stored.pair_contract.clone(), Arc::new(stored.clone()));

        let payload = PairCreated {
            pool_id: stored.id,
            pair_contract: stored.pair_contract.clone(),
            base_denom: stored.base_denom.clone(),
            quote_denom: stored.quote_denom.clone(),
            base_token_id: stored.base_token_id,
            quote_token_id: stored.quote_token_id,
            is_native_quote: stored.is_native_quote,
        };
        if let Err(e) = self.notifier.pair_created(&payload).await {
            warn!("pair_created notify failed for {}: {:#}", stored.pair_contract, e);
        }

        Ok(())
    }

    async fn run_core_task(
        &self,
        task: &CoreTask,
        block_time: DateTime<Utc>,
        height: u64,
    ) -> anyhow::Result<()> {
        let Some(pool) = self.pool_cache.get(&task.pair_contract) else {
            // Not one of ours (unknown contract); nothing to record.
            return Ok(());
        };

        match task.kind {
            CoreKind::Swap => self.handle_swap(task, &pool, block_time, height).await,
            CoreKind::Provide | CoreKind::Withdraw => {
                self.handle_liquidity(task, &pool, block_time, height).await
            },
        }
    }

    async fn handle_swap(
        &self,
        task: &CoreTask,
        pool: &Pool,
        block_time: DateTime<Utc>,
        height: u64,
    ) -> anyhow::Result<()> {
        let offer_denom = task.attrs.get("offer_asset").cloned();
        let offer_amount = task.attrs.get("offer_amount").cloned();
        let ask_denom = task.attrs.get("ask_asset").cloned();
        let return_amount = task.attrs.get("return_amount").cloned();

        let direction = offer_denom
            .as_deref()
            .map(|d| parser::classify_direction(d, &pool.quote_denom))
            .unwrap_or(TradeDirection::Sell);

        let event_reserves = task
            .attrs
            .get("reserves")
            .map(|s| parser::parse_reserves_kv(s))
            .and_then(|assets| align_reserves(&assets, &pool.base_denom, &pool.quote_denom));

        let trade = Trade {
            created_at: block_time,
            tx_hash: task.tx_hash.clone(),
            pool_id: pool.id,
            msg_index: task.msg_index,
            action: TradeAction::Swap,
            direction,
            offer_denom: offer_denom.clone(),
            offer_amount_base: offer_amount.clone(),
            ask_denom,
            return_amount_base: return_amount.clone(),
            reserve_base_base: event_reserves.as_ref().map(|(b, _)| b.clone()),
            reserve_quote_base: event_reserves.as_ref().map(|(_, q)| q.clone()),
            height: height as i64,
            signer: task.signer.clone(),
            is_router: self.is_router(task),
        };
        self.writers.trades.enqueue(trade).await?;

        if let Some((base, quote)) = event_reserves {
            self.writers
                .pool_state
                .enqueue(PoolStateUpdate {
                    pool_id: pool.id,
                    reserve_base_base: base,
                    reserve_quote_base: quote,
                    updated_at: block_time,
                })
                .await?;
        }

        // Price and candle only for native-quoted pools with a known base
        // exponent; the trade row above is never lost either way.
        let Some(base_exp) = pool.base_exponent.filter(|_| pool.is_native_quote) else {
            return Ok(());
        };

        let Some(price) = self.live_price(pool, base_exp).await else {
            return Ok(());
        };

        // Quote-leg raw volume: the offer side on a buy, the return side on
        // a sell.
        let quote_leg_raw = match direction {
            TradeDirection::Buy => offer_amount,
            _ => return_amount,
        };
        let volume_native = quote_leg_raw
            .as_deref()
            .and_then(|v| base_str_to_display(v, NATIVE_EXPONENT))
            .unwrap_or(0.0);

        self.writers
            .candles
            .enqueue(CandleTick {
                pool_id: pool.id,
                bucket_start: floor_minute(block_time),
                price,
                volume_native,
                trade_count: 1,
                liquidity_native: None,
            })
            .await?;

        self.db
            .upsert_price(&PriceUpdate {
                token_id: pool.base_token_id,
                pool_id: pool.id,
                price_in_native: price,
                is_pair_native: pool.is_native_quote,
                updated_at: Utc::now(),
            })
            .await?;

        Ok(())
    }

    async fn handle_liquidity(
        &self,
        task: &CoreTask,
        pool: &Pool,
        block_time: DateTime<Utc>,
        height: u64,
    ) -> anyhow::Result<()> {
        let (action, direction) = match task.kind {
            CoreKind::Provide => (TradeAction::Provide, TradeDirection::Provide),
            _ => (TradeAction::Withdraw, TradeDirection::Withdraw),
        };

        let event_reserves = liquidity_reserves(&task.attrs, &pool.base_denom, &pool.quote_denom);

        // The base leg of the assets list becomes the offer side of the row.
        let base_leg = task
            .attrs
            .get("assets")
            .map(|s| parser::parse_assets_list(s))
            .and_then(|assets| {
                assets
                    .into_iter()
                    .find(|a| a.denom == pool.base_denom)
            });

        let trade = Trade {
            created_at: block_time,
            tx_hash: task.tx_hash.clone(),
            pool_id: pool.id,
            msg_index: task.msg_index,
            action,
            direction,
            offer_denom: base_leg.as_ref().map(|a| a.denom.clone()),
            offer_amount_base: base_leg.as_ref().map(|a| a.amount_base.clone()),
            ask_denom: Some(pool.quote_denom.clone()),
            return_amount_base: None,
            reserve_base_base: event_reserves.as_ref().map(|(b, _)| b.clone()),
            reserve_quote_base: event_reserves.as_ref().map(|(_, q)| q.clone()),
            height: height as i64,
            signer: task.signer.clone(),
            is_router: self.is_router(task),
        };
        self.writers.trades.enqueue(trade).await?;

        let Some((base_raw, quote_raw)) = event_reserves else {
            return Ok(());
        };

        self.writers
            .pool_state
            .enqueue(PoolStateUpdate {
                pool_id: pool.id,
                reserve_base_base: base_raw.clone(),
                reserve_quote_base: quote_raw.clone(),
                updated_at: block_time,
            })
            .await?;

        // Liquidity events refresh the price (no candle).
        let Some(base_exp) = pool.base_exponent.filter(|_| pool.is_native_quote) else {
            return Ok(());
        };

        let base_disp = base_str_to_display(&base_raw, base_exp.max(0) as u32);
        let quote_disp = base_str_to_display(&quote_raw, NATIVE_EXPONENT);
        if let (Some(base_disp), Some(quote_disp)) = (base_disp, quote_disp) {
            if base_disp > 0.0 {
                if let Some(price) = validate_price(quote_disp / base_disp) {
                    self.db
                        .upsert_price(&PriceUpdate {
                            token_id: pool.base_token_id,
                            pool_id: pool.id,
                            price_in_native: price,
                            is_pair_native: pool.is_native_quote,
                            updated_at: Utc::now(),
                        })
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Live mid price from LCD reserves.
    async fn live_price(&self, pool: &Pool, base_exp: i16) -> Option<f64> {
        let response = match self.chain.query_pool(&pool.pair_contract).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Reserves query for {} failed: {:#}", pool.pair_contract, e);
                return None;
            },
        };

        let (base_raw, quote_raw) =
            parser::parse_pool_reserves(&response, &pool.base_denom, &pool.quote_denom)?;
        price_from_reserves(&base_raw, &quote_raw, base_exp.max(0) as u32)
    }

    fn is_router(&self, task: &CoreTask) -> bool {
        match (&self.router_addr, task.attrs.get("sender")) {
            (Some(router), Some(sender)) => router == sender,
            _ => false,
        }
    }
}

/// price = (quote_raw / 10^6) / (base_raw / 10^base_exp), validated.
pub fn price_from_reserves(base_raw: &str, quote_raw: &str, base_exp: u32) -> Option<f64> {
    let base_disp = base_str_to_display(base_raw, base_exp)?;
    let quote_disp = base_str_to_display(quote_raw, NATIVE_EXPONENT)?;
    if base_disp <= 0.0 {
        return None;
    }
    validate_price(quote_disp / base_disp)
}

/// Map an unordered asset pair onto (base_raw, quote_raw) by denom.
fn align_reserves(
    assets: &[parser::AssetAmount],
    base_denom: &str,
    quote_denom: &str,
) -> Option<(String, String)> {
    let base = assets.iter().find(|a| a.denom == base_denom)?;
    let quote = assets.iter().find(|a| a.denom == quote_denom)?;
    Some((base.amount_base.clone(), quote.amount_base.clone()))
}

/// Reserves from `reserve_asset{1,2}_{denom,amount}` attributes.
fn liquidity_reserves(
    attrs: &FxHashMap<String, String>,
    base_denom: &str,
    quote_denom: &str,
) -> Option<(String, String)> {
    let pairs = [
        (attrs.get("reserve_asset1_denom"), attrs.get("reserve_asset1_amount")),
        (attrs.get("reserve_asset2_denom"), attrs.get("reserve_asset2_amount")),
    ];

    let mut base_raw = None;
    let mut quote_raw = None;
    for (denom, amount) in pairs {
        let (Some(denom), Some(amount)) = (denom, amount) else {
            continue;
        };
        if denom == base_denom {
            base_raw = Some(amount.clone());
        } else if denom == quote_denom {
            quote_raw = Some(amount.clone());
        }
    }

    match (base_raw, quote_raw) {
        (Some(b), Some(q)) => Some((b, q)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::parser::events_from_tx;

    const FACTORY: &str = "zig1factory";

    fn pair_creation_tx() -> serde_json::Value {
        serde_json::json!({
            "code": 0,
            "events": [
                {"type": "message", "attributes": [
                    {"key": "sender", "value": "zig1signer"}
                ]},
                {"type": "wasm", "attributes": [
                    {"key": "_contract_address", "value": FACTORY},
                    {"key": "action", "value": "create_pair"},
                    {"key": "pair", "value": "TKN-uzig"},
                    {"key": "pair_type", "value": "xyk"},
                    {"key": "msg_index", "value": "0"}
                ]},
                {"type": "wasm", "attributes": [
                    {"key": "_contract_address", "value": FACTORY},
                    {"key": "action", "value": "register"},
                    {"key": "pair_contract_addr", "value": "zig1pair"}
                ]},
                {"type": "wasm", "attributes": [
                    {"key": "_contract_address", "value": "zig1pair"},
                    {"key": "action", "value": "provide_liquidity"},
                    {"key": "reserve_asset1_denom", "value": "TKN"},
                    {"key": "reserve_asset1_amount", "value": "1000000000"},
                    {"key": "reserve_asset2_denom", "value": "uzig"},
                    {"key": "reserve_asset2_amount", "value": "2000000"},
                    {"key": "assets", "value": "1000000000TKN,2000000uzig"},
                    {"key": "msg_index", "value": "0"}
                ]}
            ]
        })
    }

    #[test]
    fn scan_collects_creation_and_liquidity_from_same_tx() {
        let events = events_from_tx(&pair_creation_tx());
        let scan = scan_tx(&events, "HASH", FACTORY);

        assert_eq!(scan.creations.len(), 1);
        let creation = &scan.creations[0];
        assert_eq!(creation.pool_addr, "zig1pair");
        assert_eq!(creation.pair, "TKN-uzig");
        assert_eq!(creation.signer.as_deref(), Some("zig1signer"));

        assert_eq!(scan.tasks.len(), 1);
        assert_eq!(scan.tasks[0].kind, CoreKind::Provide);
        assert_eq!(scan.tasks[0].pair_contract, "zig1pair");
    }

    #[test]
    fn scan_ignores_foreign_factories() {
        let events = events_from_tx(&pair_creation_tx());
        let scan = scan_tx(&events, "HASH", "zig1otherfactory");
        assert!(scan.creations.is_empty());
    }

    #[test]
    fn scan_falls_back_to_instantiate_address() {
        let tx = serde_json::json!({
            "events": [
                {"type": "wasm", "attributes": [
                    {"key": "_contract_address", "value": FACTORY},
                    {"key": "action", "value": "create_pair"},
                    {"key": "pair", "value": "AAA-uzig"}
                ]},
                {"type": "instantiate", "attributes": [
                    {"key": "_contract_address", "value": FACTORY}
                ]},
                {"type": "instantiate", "attributes": [
                    {"key": "_contract_address", "value": "zig1newpool"}
                ]}
            ]
        });
        let events = events_from_tx(&tx);
        let scan = scan_tx(&events, "HASH", FACTORY);

        assert_eq!(scan.creations.len(), 1);
        assert_eq!(scan.creations[0].pool_addr, "zig1newpool");
    }

    #[test]
    fn price_orientation_from_reserves() {
        // (2.5 quote) / (760 base) with base exponent 6
        let price = price_from_reserves("760000000", "2500000", 6).unwrap();
        assert!((price - 0.003289473684).abs() < 1e-9);

        // exponent-aware: base exponent 8 rescales the base leg
        let price = price_from_reserves("100000000", "2000000", 8).unwrap();
        assert!((price - 2.0).abs() < 1e-12);

        assert!(price_from_reserves("0", "2500000", 6).is_none());
    }

    #[test]
    fn liquidity_reserves_align_by_denom() {
        let events = events_from_tx(&pair_creation_tx());
        let scan = scan_tx(&events, "HASH", FACTORY);
        let attrs = &scan.tasks[0].attrs;

        let (base, quote) = liquidity_reserves(attrs, "TKN", "uzig").unwrap();
        assert_eq!(base, "1000000000");
        assert_eq!(quote, "2000000");
    }
}

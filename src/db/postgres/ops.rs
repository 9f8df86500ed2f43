use chrono::{DateTime, Utc};
use log::error;

use crate::db::models::{FxRate, IndexState, Pool, PriceUpdate, Token, TokenKind, Trade};
use crate::db::postgres::PostgresClient;

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
pub fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

const POOL_SELECT: &str = r#"
    SELECT
        p.id, p.pair_contract, p.base_token_id, p.quote_token_id,
        p.base_denom, p.quote_denom, p.lp_denom, p.pair_type, p.is_native_quote,
        p.factory_addr, p.router_addr, p.created_height, p.created_tx,
        p.created_signer, p.created_at,
        bt.exponent AS base_exponent, qt.exponent AS quote_exponent
    FROM indexer.pools p
    JOIN indexer.tokens bt ON bt.id = p.base_token_id
    JOIN indexer.tokens qt ON qt.id = p.quote_token_id
"#;

const TOKEN_SELECT: &str = r#"
    SELECT
        id, denom, kind, name, symbol, display, image, website, twitter,
        telegram, description, exponent, max_supply_base, total_supply_base,
        minting_cap_base, can_change_minting_cap, updated_at
    FROM indexer.tokens
"#;

impl PostgresClient {
    // ==================== TOKENS ====================

    /// Insert a stub row for a denom if missing and return the full token.
    pub async fn ensure_token(&self, denom: &str) -> anyhow::Result<Token> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer.tokens (denom, kind)
            VALUES ($1, $2)
            ON CONFLICT (denom) DO UPDATE SET denom = EXCLUDED.denom
            RETURNING
                id, denom, kind, name, symbol, display, image, website, twitter,
                telegram, description, exponent, max_supply_base, total_supply_base,
                minting_cap_base, can_change_minting_cap, updated_at
        "#;

        let kind = TokenKind::classify(denom).as_str();
        let row = client
            .query_one(query, &[&sanitize_string(denom), &kind])
            .await
            .map_err(|e| {
                error!("Failed to ensure token {}: {:?}", denom, e);
                e
            })?;

        Ok(row_to_token(&row))
    }

    /// Seed the native token with its fixed exponent (6) so price paths work
    /// from the very first block.
    pub async fn ensure_native_token(&self, denom: &str) -> anyhow::Result<Token> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer.tokens (denom, kind, exponent, symbol, display)
            VALUES ($1, 'native', 6, $2, $3)
            ON CONFLICT (denom) DO UPDATE SET
                exponent = COALESCE(indexer.tokens.exponent, 6)
            RETURNING
                id, denom, kind, name, symbol, display, image, website, twitter,
                telegram, description, exponent, max_supply_base, total_supply_base,
                minting_cap_base, can_change_minting_cap, updated_at
        "#;

        // uzig -> display "zig", symbol "ZIG"
        let display = denom.strip_prefix('u').unwrap_or(denom).to_string();
        let symbol = display.to_uppercase();
        let row = client.query_one(query, &[&denom, &symbol, &display]).await?;
        Ok(row_to_token(&row))
    }

    pub async fn get_token_by_denom(&self, denom: &str) -> anyhow::Result<Option<Token>> {
        let client = self.pool.get().await?;
        let query = format!("{} WHERE denom = $1", TOKEN_SELECT);
        let row = client.query_opt(&query, &[&denom]).await?;
        Ok(row.map(|r| row_to_token(&r)))
    }

    pub async fn get_token_by_id(&self, id: i64) -> anyhow::Result<Option<Token>> {
        let client = self.pool.get().await?;
        let query = format!("{} WHERE id = $1", TOKEN_SELECT);
        let row = client.query_opt(&query, &[&id]).await?;
        Ok(row.map(|r| row_to_token(&r)))
    }

    /// Apply resolved metadata with never-clobber-with-null semantics: a null
    /// incoming field keeps the existing value.
    pub async fn update_token_metadata(&self, token: &Token) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE indexer.tokens SET
                kind = $2,
                name = COALESCE($3, name),
                symbol = COALESCE($4, symbol),
                display = COALESCE($5, display),
                image = COALESCE($6, image),
                website = COALESCE($7, website),
                twitter = COALESCE($8, twitter),
                telegram = COALESCE($9, telegram),
                description = COALESCE($10, description),
                exponent = COALESCE($11, exponent),
                updated_at = NOW()
            WHERE denom = $1
        "#;

        let name = token.name.as_deref().map(sanitize_string);
        let symbol = token.symbol.as_deref().map(sanitize_string);
        let description = token.description.as_deref().map(sanitize_string);

        client
            .execute(
                query,
                &[
                    &token.denom,
                    &token.kind.as_str(),
                    &name,
                    &symbol,
                    &token.display,
                    &token.image,
                    &token.website,
                    &token.twitter,
                    &token.telegram,
                    &description,
                    &token.exponent,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to update token metadata {}: {:?}", token.denom, e);
                e
            })?;

        Ok(())
    }

    /// Persist supply/minting facts from the factory endpoint.
    pub async fn update_token_supply(
        &self,
        denom: &str,
        max_supply_base: Option<&str>,
        total_supply_base: Option<&str>,
        minting_cap_base: Option<&str>,
        can_change_minting_cap: Option<bool>,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE indexer.tokens SET
                max_supply_base = COALESCE($2, max_supply_base),
                total_supply_base = COALESCE($3, total_supply_base),
                minting_cap_base = COALESCE($4, minting_cap_base),
                can_change_minting_cap = COALESCE($5, can_change_minting_cap),
                updated_at = NOW()
            WHERE denom = $1
        "#;

        client
            .execute(
                query,
                &[
                    &denom,
                    &max_supply_base,
                    &total_supply_base,
                    &minting_cap_base,
                    &can_change_minting_cap,
                ],
            )
            .await?;

        Ok(())
    }

    /// Tokens with missing or stale metadata, stalest first.
    pub async fn stale_meta_tokens(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<Token>> {
        let client = self.pool.get().await?;
        let query = format!(
            "{} WHERE exponent IS NULL OR symbol IS NULL OR updated_at < $1 \
             ORDER BY updated_at ASC LIMIT $2",
            TOKEN_SELECT
        );
        let rows = client.query(&query, &[&older_than, &limit]).await?;
        Ok(rows.iter().map(row_to_token).collect())
    }

    // ==================== POOLS ====================

    /// Insert a pool discovered via `create_pair` and return the stored row.
    ///
    /// Creation metadata is immutable: a replayed event only backfills a
    /// missing lp_denom.
    pub async fn upsert_pool(&self, pool: &Pool) -> anyhow::Result<Pool> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer.pools (
                pair_contract, base_token_id, quote_token_id, base_denom,
                quote_denom, lp_denom, pair_type, is_native_quote, factory_addr,
                router_addr, created_height, created_tx, created_signer, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (pair_contract) DO UPDATE SET
                lp_denom = COALESCE(indexer.pools.lp_denom, EXCLUDED.lp_denom)
            RETURNING id
        "#;

        let row = client
            .query_one(
                query,
                &[
                    &pool.pair_contract,
                    &pool.base_token_id,
                    &pool.quote_token_id,
                    &pool.base_denom,
                    &pool.quote_denom,
                    &pool.lp_denom,
                    &pool.pair_type.as_str(),
                    &pool.is_native_quote,
                    &pool.factory_addr,
                    &pool.router_addr,
                    &pool.created_height,
                    &pool.created_tx,
                    &pool.created_signer,
                    &pool.created_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to upsert pool {}: {:?}", pool.pair_contract, e);
                e
            })?;

        let id: i64 = row.get("id");
        self.get_pool_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Pool {} vanished after upsert", id))
    }

    pub async fn get_pool_by_id(&self, id: i64) -> anyhow::Result<Option<Pool>> {
        let client = self.pool.get().await?;
        let query = format!("{} WHERE p.id = $1", POOL_SELECT);
        let row = client.query_opt(&query, &[&id]).await?;
        Ok(row.map(|r| row_to_pool(&r)))
    }

    pub async fn get_pool_by_contract(&self, pair_contract: &str) -> anyhow::Result<Option<Pool>> {
        let client = self.pool.get().await?;
        let query = format!("{} WHERE p.pair_contract = $1", POOL_SELECT);
        let row = client.query_opt(&query, &[&pair_contract]).await?;
        Ok(row.map(|r| row_to_pool(&r)))
    }

    /// Batch fetch pools by pair contract (prefetch phase).
    pub async fn get_pools_by_contracts(
        &self,
        pair_contracts: &[String],
    ) -> anyhow::Result<Vec<Pool>> {
        if pair_contracts.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let query = format!("{} WHERE p.pair_contract = ANY($1)", POOL_SELECT);
        let rows = client.query(&query, &[&pair_contracts]).await?;
        Ok(rows.iter().map(row_to_pool).collect())
    }

    pub async fn list_pools(&self) -> anyhow::Result<Vec<Pool>> {
        let client = self.pool.get().await?;
        let query = format!("{} ORDER BY p.id", POOL_SELECT);
        let rows = client.query(&query, &[]).await?;
        Ok(rows.iter().map(row_to_pool).collect())
    }

    pub async fn native_quoted_pools(&self) -> anyhow::Result<Vec<Pool>> {
        let client = self.pool.get().await?;
        let query = format!("{} WHERE p.is_native_quote ORDER BY p.id", POOL_SELECT);
        let rows = client.query(&query, &[]).await?;
        Ok(rows.iter().map(row_to_pool).collect())
    }

    // ==================== TRADES ====================

    /// Earliest provide-liquidity trade for a pool, by (height, msg_index).
    /// Used to seed the initial price and candle for a new pair.
    pub async fn first_provide_trade(&self, pool_id: i64) -> anyhow::Result<Option<Trade>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                created_at, tx_hash, pool_id, msg_index, action, direction,
                offer_denom, offer_amount_base, ask_denom, return_amount_base,
                reserve_base_base, reserve_quote_base, height, signer, is_router
            FROM indexer.trades
            WHERE pool_id = $1 AND action = 'provide'
            ORDER BY height ASC, msg_index ASC
            LIMIT 1
        "#;

        let row = client.query_opt(query, &[&pool_id]).await?;
        Ok(row.map(|r| row_to_trade(&r)))
    }

    // ==================== PRICES ====================

    /// Upsert the latest (token, pool) price and append a trail tick.
    pub async fn upsert_price(&self, price: &PriceUpdate) -> anyhow::Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO indexer.prices (token_id, pool_id, price_in_native, is_pair_native, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token_id, pool_id) DO UPDATE SET
                price_in_native = EXCLUDED.price_in_native,
                is_pair_native = EXCLUDED.is_pair_native,
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &price.token_id,
                &price.pool_id,
                &price.price_in_native,
                &price.is_pair_native,
                &price.updated_at,
            ],
        )
        .await?;

        tx.execute(
            r#"
            INSERT INTO indexer.price_ticks (token_id, pool_id, price_in_native, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
            &[
                &price.token_id,
                &price.pool_id,
                &price.price_in_native,
                &price.updated_at,
            ],
        )
        .await?;

        tx.commit().await.map_err(|e| {
            error!(
                "Failed to upsert price (token {}, pool {}): {:?}",
                price.token_id, price.pool_id, e
            );
            anyhow::Error::from(e)
        })
    }

    // ==================== INDEX STATE ====================

    pub async fn get_index_state(&self) -> anyhow::Result<Option<IndexState>> {
        let client = self.pool.get().await?;
        let query = "SELECT last_height, updated_at FROM indexer.index_state WHERE id = 'block'";
        let row = client.query_opt(query, &[]).await?;

        Ok(row.map(|r| IndexState {
            last_height: r.get("last_height"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Persist the checkpoint. GREATEST keeps the stored height monotonic
    /// even if a stale writer races a fresher one.
    pub async fn set_index_state(&self, state: &IndexState) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer.index_state (id, last_height, updated_at)
            VALUES ('block', $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                last_height = GREATEST(indexer.index_state.last_height, EXCLUDED.last_height),
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(query, &[&state.last_height, &state.updated_at])
            .await
            .map_err(|e| {
                error!(
                    "Failed to set index state to {}: {:?}",
                    state.last_height, e
                );
                e
            })?;

        Ok(())
    }

    // ==================== HOLDERS ====================

    /// Tokens whose holder sets are stalest, excluding native and IBC assets
    /// (the ownership endpoint does not serve them usefully).
    pub async fn stalest_holder_tokens(&self, limit: i64) -> anyhow::Result<Vec<Token>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                t.id, t.denom, t.kind, t.name, t.symbol, t.display, t.image,
                t.website, t.twitter, t.telegram, t.description, t.exponent,
                t.max_supply_base, t.total_supply_base, t.minting_cap_base,
                t.can_change_minting_cap, t.updated_at
            FROM indexer.tokens t
            LEFT JOIN indexer.holder_stats hs ON hs.token_id = t.id
            WHERE t.kind NOT IN ('native', 'ibc')
            ORDER BY hs.updated_at ASC NULLS FIRST
            LIMIT $1
        "#;
        let rows = client.query(query, &[&limit]).await?;
        Ok(rows.iter().map(row_to_token).collect())
    }

    /// Upsert one page of holder balances in a single transaction.
    pub async fn upsert_holder_page(
        &self,
        token_id: i64,
        entries: &[(String, String)],
    ) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let addresses: Vec<&str> = entries.iter().map(|(a, _)| a.as_str()).collect();
        let balances: Vec<&str> = entries.iter().map(|(_, b)| b.as_str()).collect();

        tx.execute(
            r#"
            INSERT INTO indexer.holders (token_id, address, balance_base, updated_at)
            SELECT $1, t.address, t.balance_base, NOW()
            FROM UNNEST($2::text[], $3::text[]) AS t(address, balance_base)
            ON CONFLICT (token_id, address) DO UPDATE SET
                balance_base = EXCLUDED.balance_base,
                updated_at = EXCLUDED.updated_at
            "#,
            &[&token_id, &addresses, &balances],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Finalize a sweep: zero balances for addresses not seen in this pass,
    /// then recompute the positive-balance holder count. One transaction.
    pub async fn finalize_holders(&self, token_id: i64, seen: &[String]) -> anyhow::Result<i64> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            UPDATE indexer.holders
            SET balance_base = '0', updated_at = NOW()
            WHERE token_id = $1 AND balance_base <> '0' AND NOT (address = ANY($2))
            "#,
            &[&token_id, &seen],
        )
        .await?;

        let row = tx
            .query_one(
                r#"
                INSERT INTO indexer.holder_stats (token_id, holders_count, updated_at)
                SELECT $1, COUNT(*), NOW()
                FROM indexer.holders
                WHERE token_id = $1 AND balance_base <> '0'
                ON CONFLICT (token_id) DO UPDATE SET
                    holders_count = EXCLUDED.holders_count,
                    updated_at = EXCLUDED.updated_at
                RETURNING holders_count
                "#,
                &[&token_id],
            )
            .await?;

        tx.commit().await?;
        Ok(row.get("holders_count"))
    }

    /// Bump the stats timestamp without touching balances (fairness bump for
    /// tokens the ownership endpoint does not support).
    pub async fn touch_holder_stats(&self, token_id: i64) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO indexer.holder_stats (token_id, holders_count, updated_at)
                VALUES ($1, 0, NOW())
                ON CONFLICT (token_id) DO UPDATE SET updated_at = NOW()
                "#,
                &[&token_id],
            )
            .await?;
        Ok(())
    }

    // ==================== FX ====================

    /// Minute-idempotent FX upsert; a second sample in the same minute
    /// overwrites the first.
    pub async fn upsert_fx_rate(&self, rate: &FxRate) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO indexer.fx_rates (ts, native_per_usd)
                VALUES ($1, $2)
                ON CONFLICT (ts) DO UPDATE SET native_per_usd = EXCLUDED.native_per_usd
                "#,
                &[&rate.ts, &rate.native_per_usd],
            )
            .await?;
        Ok(())
    }
}

// ==================== HELPER FUNCTIONS ====================

fn row_to_token(row: &tokio_postgres::Row) -> Token {
    let kind: String = row.get("kind");

    Token {
        id: row.get("id"),
        denom: row.get("denom"),
        kind: TokenKind::from_str(&kind),
        name: row.get("name"),
        symbol: row.get("symbol"),
        display: row.get("display"),
        image: row.get("image"),
        website: row.get("website"),
        twitter: row.get("twitter"),
        telegram: row.get("telegram"),
        description: row.get("description"),
        exponent: row.get("exponent"),
        max_supply_base: row.get("max_supply_base"),
        total_supply_base: row.get("total_supply_base"),
        minting_cap_base: row.get("minting_cap_base"),
        can_change_minting_cap: row.get("can_change_minting_cap"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_pool(row: &tokio_postgres::Row) -> Pool {
    let pair_type: String = row.get("pair_type");

    Pool {
        id: row.get("id"),
        pair_contract: row.get("pair_contract"),
        base_token_id: row.get("base_token_id"),
        quote_token_id: row.get("quote_token_id"),
        base_denom: row.get("base_denom"),
        quote_denom: row.get("quote_denom"),
        lp_denom: row.get("lp_denom"),
        pair_type: crate::db::models::PairType::from_str(&pair_type),
        is_native_quote: row.get("is_native_quote"),
        factory_addr: row.get("factory_addr"),
        router_addr: row.get("router_addr"),
        created_height: row.get("created_height"),
        created_tx: row.get("created_tx"),
        created_signer: row.get("created_signer"),
        created_at: row.get("created_at"),
        base_exponent: row.get("base_exponent"),
        quote_exponent: row.get("quote_exponent"),
    }
}

fn row_to_trade(row: &tokio_postgres::Row) -> Trade {
    let action: String = row.get("action");
    let direction: String = row.get("direction");

    use crate::db::models::{TradeAction, TradeDirection};
    Trade {
        created_at: row.get("created_at"),
        tx_hash: row.get("tx_hash"),
        pool_id: row.get("pool_id"),
        msg_index: row.get("msg_index"),
        action: match action.as_str() {
            "provide" => TradeAction::Provide,
            "withdraw" => TradeAction::Withdraw,
            _ => TradeAction::Swap,
        },
        direction: match direction.as_str() {
            "buy" => TradeDirection::Buy,
            "provide" => TradeDirection::Provide,
            "withdraw" => TradeDirection::Withdraw,
            _ => TradeDirection::Sell,
        },
        offer_denom: row.get("offer_denom"),
        offer_amount_base: row.get("offer_amount_base"),
        ask_denom: row.get("ask_denom"),
        return_amount_base: row.get("return_amount_base"),
        reserve_base_base: row.get("reserve_base_base"),
        reserve_quote_base: row.get("reserve_quote_base"),
        height: row.get("height"),
        signer: row.get("signer"),
        is_router: row.get("is_router"),
    }
}

//! Canonical token metadata resolution.
//!
//! Merges on-chain bank metadata, IBC denom traces, metadata URIs, the
//! static asset registry, and factory supply data into one token row.
//! Merging never clobbers an existing non-null column with a null.

use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::chain::ChainClient;
use crate::config::JobSettings;
use crate::db::models::{Token, TokenKind};
use crate::db::PostgresClient;

/// Field bundle from one metadata source.
#[derive(Debug, Clone, Default)]
pub struct TokenMeta {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub display: Option<String>,
    pub image: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub description: Option<String>,
    pub exponent: Option<i16>,
}

/// Static asset registry entry, addressable by base denom, display, alias,
/// or symbol.
#[derive(Debug, Clone)]
struct RegistryAsset {
    keys: Vec<String>,
    meta: TokenMeta,
}

struct Registry {
    assets: Vec<RegistryAsset>,
}

impl Registry {
    fn find(&self, key: &str) -> Option<&TokenMeta> {
        self.assets
            .iter()
            .find(|a| a.keys.iter().any(|k| k == key))
            .map(|a| &a.meta)
    }

    fn from_assetlist(json: &Value) -> Self {
        let assets = json["assets"]
            .as_array()
            .map(|assets| {
                assets
                    .iter()
                    .filter_map(|asset| {
                        let base = asset["base"].as_str()?;
                        let mut keys = vec![base.to_string()];
                        for field in ["display", "symbol"] {
                            if let Some(v) = asset[field].as_str() {
                                keys.push(v.to_string());
                            }
                        }
                        if let Some(units) = asset["denom_units"].as_array() {
                            for unit in units {
                                if let Some(aliases) = unit["aliases"].as_array() {
                                    keys.extend(
                                        aliases.iter().filter_map(|a| a.as_str().map(String::from)),
                                    );
                                }
                            }
                        }

                        let display = asset["display"].as_str();
                        let exponent = display.and_then(|d| exponent_for_display(asset, d));

                        Some(RegistryAsset {
                            keys,
                            meta: TokenMeta {
                                name: asset["name"].as_str().map(String::from),
                                symbol: asset["symbol"].as_str().map(String::from),
                                display: display.map(String::from),
                                image: asset["logo_URIs"]["png"]
                                    .as_str()
                                    .or_else(|| asset["logo_URIs"]["svg"].as_str())
                                    .map(String::from),
                                website: asset["socials"]["website"].as_str().map(String::from),
                                twitter: asset["socials"]["twitter"].as_str().map(String::from),
                                telegram: asset["socials"]["telegram"].as_str().map(String::from),
                                description: asset["description"].as_str().map(String::from),
                                exponent,
                            },
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Registry { assets }
    }
}

/// Exponent of the denom unit matching the display field (by denom or
/// alias).
fn exponent_for_display(meta: &Value, display: &str) -> Option<i16> {
    let units = meta["denom_units"].as_array()?;
    for unit in units {
        let matches = unit["denom"].as_str() == Some(display)
            || unit["aliases"]
                .as_array()
                .map(|a| a.iter().any(|v| v.as_str() == Some(display)))
                .unwrap_or(false);
        if matches {
            return unit["exponent"].as_i64().map(|e| e as i16);
        }
    }
    None
}

/// Merge the live (LCD + URI) source with a registry entry.
///
/// The registry wins for curated names; the live source wins everywhere
/// else, with the registry filling gaps.
pub fn merge_sources(live: TokenMeta, registry: Option<&TokenMeta>) -> TokenMeta {
    let Some(reg) = registry else {
        return live;
    };

    TokenMeta {
        name: reg.name.clone().or(live.name),
        symbol: live.symbol.or_else(|| reg.symbol.clone()),
        display: live.display.or_else(|| reg.display.clone()),
        image: live.image.or_else(|| reg.image.clone()),
        website: live.website.or_else(|| reg.website.clone()),
        twitter: live.twitter.or_else(|| reg.twitter.clone()),
        telegram: live.telegram.or_else(|| reg.telegram.clone()),
        description: live.description.or_else(|| reg.description.clone()),
        exponent: live.exponent.or(reg.exponent),
    }
}

/// Resolves and persists token metadata.
pub struct MetadataResolver {
    chain: Arc<ChainClient>,
    db: Arc<PostgresClient>,
    http: reqwest::Client,
    registry: OnceCell<Option<Arc<Registry>>>,
    registry_url: Option<String>,
    use_registry: bool,
}

impl MetadataResolver {
    pub fn new(chain: Arc<ChainClient>, db: Arc<PostgresClient>, settings: &JobSettings) -> Self {
        Self {
            http: chain.http(),
            chain,
            db,
            registry: OnceCell::new(),
            registry_url: settings.registry_url.clone(),
            use_registry: settings.use_chain_registry,
        }
    }

    /// Refresh one denom end to end. The token row is created if missing.
    pub async fn refresh(&self, denom: &str) -> anyhow::Result<()> {
        let token = self.db.ensure_token(denom).await?;

        let mut kind = token.kind;
        let mut lookup = denom.to_string();

        // IBC denoms resolve through their trace first.
        if let Some(hash) = denom.strip_prefix("ibc/") {
            kind = TokenKind::Ibc;
            match self.chain.ibc_denom_trace(hash).await {
                Ok(trace) => {
                    if let Some(base) = trace["denom_trace"]["base_denom"]
                        .as_str()
                        .or_else(|| trace["denom"]["base"].as_str())
                    {
                        lookup = base.to_string();
                    }
                },
                Err(e) => warn!("IBC trace for {} failed: {:#}", denom, e),
            }
        }

        let mut live = self.fetch_bank_metadata(&lookup).await.unwrap_or_default();

        // Exponent fallbacks when bank metadata is silent.
        if live.exponent.is_none() {
            if kind == TokenKind::Ibc {
                live.exponent = Some(6);
            } else if let Some(core) = micro_core(&lookup) {
                live.exponent = Some(0);
                live.symbol.get_or_insert_with(|| core.clone());
                live.display.get_or_insert(core);
            }
        }

        let registry = self.registry().await;
        let registry_meta = registry
            .as_deref()
            .and_then(|r| resolve_registry_meta(r, &lookup, &live));
        let merged = merge_sources(live, registry_meta);

        let row = Token {
            kind,
            name: merged.name,
            symbol: merged.symbol,
            display: merged.display,
            image: merged.image,
            website: merged.website,
            twitter: merged.twitter,
            telegram: merged.telegram,
            description: merged.description,
            exponent: merged.exponent,
            ..token
        };
        self.db.update_token_metadata(&row).await?;

        if kind == TokenKind::Factory {
            if let Err(e) = self.refresh_supply(denom).await {
                warn!("Factory supply refresh for {} failed: {:#}", denom, e);
            }
        }

        Ok(())
    }

    /// Bank metadata plus an optional URI fetch.
    async fn fetch_bank_metadata(&self, lookup: &str) -> Option<TokenMeta> {
        let response = match self.chain.denom_metadata(lookup).await {
            Ok(r) => r,
            Err(e) => {
                warn!("denom_metadata for {} failed: {:#}", lookup, e);
                return None;
            },
        };
        let meta = &response["metadata"];
        if meta.is_null() {
            return None;
        }

        let display = meta["display"].as_str();
        let mut out = TokenMeta {
            name: meta["name"].as_str().map(String::from),
            symbol: meta["symbol"].as_str().map(String::from),
            display: display.map(String::from),
            description: meta["description"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(String::from),
            exponent: display.and_then(|d| exponent_for_display(meta, d)),
            ..TokenMeta::default()
        };

        if let Some(uri) = meta["uri"].as_str().filter(|u| u.starts_with("http")) {
            self.enrich_from_uri(uri, &mut out).await;
        }

        Some(out)
    }

    /// A metadata URI is either the token image itself or a JSON document
    /// with an icon and socials.
    async fn enrich_from_uri(&self, uri: &str, meta: &mut TokenMeta) {
        let response = match self.http.get(uri).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Metadata URI {} returned {}", uri, r.status());
                return;
            },
            Err(e) => {
                warn!("Metadata URI {} fetch failed: {:#}", uri, e);
                return;
            },
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("image/") {
            meta.image = Some(uri.to_string());
            return;
        }

        if let Ok(json) = response.json::<Value>().await {
            for key in ["icon", "image", "logo"] {
                if let Some(v) = json[key].as_str() {
                    meta.image.get_or_insert_with(|| v.to_string());
                }
            }
            for (key, slot) in [
                ("website", &mut meta.website),
                ("twitter", &mut meta.twitter),
                ("telegram", &mut meta.telegram),
                ("description", &mut meta.description),
            ] {
                if let Some(v) = json[key].as_str() {
                    slot.get_or_insert_with(|| v.to_string());
                }
            }
        }
    }

    /// Supply and minting-cap facts from the factory module. Doubles as the
    /// security scan for fast-tracked pairs.
    pub async fn refresh_supply(&self, denom: &str) -> anyhow::Result<()> {
        let response = self
            .chain
            .factory_denom(denom)
            .await
            .context("factory_denom query failed")?;

        let fields = if response["denom"].is_object() {
            &response["denom"]
        } else {
            &response
        };

        let max_supply = fields["max_supply"].as_str();
        let total_supply = fields["total_supply"].as_str();
        let minting_cap = fields["minting_cap"].as_str();
        let can_change = fields["can_change_minting_cap"].as_bool();

        if max_supply.is_none() && total_supply.is_none() && can_change.is_none() {
            return Ok(());
        }

        if can_change == Some(true) {
            info!("Token {} has a mutable minting cap", denom);
        }

        self.db
            .update_token_supply(denom, max_supply, total_supply, minting_cap, can_change)
            .await
    }

    /// Lazy-loaded registry; fetched at most once per process.
    async fn registry(&self) -> Option<Arc<Registry>> {
        if !self.use_registry {
            return None;
        }

        self.registry
            .get_or_init(|| async {
                let url = self.registry_url.as_ref()?;
                match self.http.get(url).send().await {
                    Ok(r) if r.status().is_success() => match r.json::<Value>().await {
                        Ok(json) => {
                            let registry = Registry::from_assetlist(&json);
                            info!("Loaded asset registry ({} assets)", registry.assets.len());
                            Some(Arc::new(registry))
                        },
                        Err(e) => {
                            warn!("Asset registry parse failed: {:#}", e);
                            None
                        },
                    },
                    Ok(r) => {
                        warn!("Asset registry fetch returned {}", r.status());
                        None
                    },
                    Err(e) => {
                        warn!("Asset registry fetch failed: {:#}", e);
                        None
                    },
                }
            })
            .await
            .clone()
    }
}

/// Registry lookup by (base, display, alias, symbol).
fn resolve_registry_meta<'a>(
    registry: &'a Registry,
    lookup: &str,
    live: &TokenMeta,
) -> Option<&'a TokenMeta> {
    registry
        .find(lookup)
        .or_else(|| live.display.as_deref().and_then(|d| registry.find(d)))
        .or_else(|| live.symbol.as_deref().and_then(|s| registry.find(s)))
}

/// `uatom` -> `atom`: the micro-denom naming convention.
fn micro_core(denom: &str) -> Option<String> {
    let core = denom.strip_prefix('u')?;
    if !core.is_empty() && core.chars().all(|c| c.is_ascii_lowercase()) {
        Some(core.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_taken_from_display_unit() {
        let meta = serde_json::json!({
            "base": "utkn",
            "display": "tkn",
            "denom_units": [
                {"denom": "utkn", "exponent": 0},
                {"denom": "tkn", "exponent": 6}
            ]
        });
        assert_eq!(exponent_for_display(&meta, "tkn"), Some(6));
        assert_eq!(exponent_for_display(&meta, "utkn"), Some(0));
        assert_eq!(exponent_for_display(&meta, "other"), None);
    }

    #[test]
    fn exponent_matches_aliases_too() {
        let meta = serde_json::json!({
            "denom_units": [
                {"denom": "microtkn", "exponent": 0, "aliases": ["utkn"]},
                {"denom": "TKN", "exponent": 8, "aliases": ["tkn"]}
            ]
        });
        assert_eq!(exponent_for_display(&meta, "tkn"), Some(8));
    }

    #[test]
    fn merge_prefers_registry_names_and_live_rest() {
        let live = TokenMeta {
            name: Some("onchain name".into()),
            symbol: Some("TKN".into()),
            exponent: Some(6),
            ..TokenMeta::default()
        };
        let registry = TokenMeta {
            name: Some("Curated Token".into()),
            symbol: Some("CTKN".into()),
            image: Some("https://assets.example/tkn.png".into()),
            exponent: Some(8),
            ..TokenMeta::default()
        };

        let merged = merge_sources(live, Some(&registry));
        assert_eq!(merged.name.as_deref(), Some("Curated Token"));
        assert_eq!(merged.symbol.as_deref(), Some("TKN"));
        assert_eq!(merged.exponent, Some(6));
        assert_eq!(merged.image.as_deref(), Some("https://assets.example/tkn.png"));
    }

    #[test]
    fn merge_without_registry_is_identity() {
        let live = TokenMeta {
            symbol: Some("TKN".into()),
            ..TokenMeta::default()
        };
        let merged = merge_sources(live.clone(), None);
        assert_eq!(merged.symbol, live.symbol);
        assert!(merged.name.is_none());
    }

    #[test]
    fn micro_denoms_fall_back_to_core() {
        assert_eq!(micro_core("uatom"), Some("atom".to_string()));
        assert_eq!(micro_core("uzig"), Some("zig".to_string()));
        assert_eq!(micro_core("factory/zig1abc/coin"), None);
        assert_eq!(micro_core("u"), None);
    }

    #[test]
    fn registry_finds_by_any_key() {
        let json = serde_json::json!({
            "assets": [{
                "base": "utkn",
                "display": "tkn",
                "symbol": "TKN",
                "name": "Token",
                "denom_units": [
                    {"denom": "utkn", "exponent": 0, "aliases": ["microtkn"]},
                    {"denom": "tkn", "exponent": 6}
                ]
            }]
        });
        let registry = Registry::from_assetlist(&json);

        for key in ["utkn", "tkn", "TKN", "microtkn"] {
            assert!(registry.find(key).is_some(), "missing key {}", key);
        }
        assert_eq!(registry.find("utkn").unwrap().exponent, Some(6));
        assert!(registry.find("nope").is_none());
    }
}

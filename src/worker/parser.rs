//! Event parsing for block-results payloads.
//!
//! Converts the raw JSON event lists into typed views once per transaction,
//! so downstream phases never re-scan the tree. Attribute keys and values
//! arrive base64-encoded on older node versions and plain on newer ones;
//! decoding only happens when it is provably safe.

use base64::Engine;
use rustc_hash::FxHashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::db::models::TradeDirection;

/// One event with decoded attributes.
#[derive(Debug, Clone)]
pub struct EventView {
    pub ty: String,
    pub attrs: FxHashMap<String, String>,
}

impl EventView {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    pub fn contract_address(&self) -> Option<&str> {
        self.attr("_contract_address")
    }

    pub fn msg_index(&self) -> i32 {
        self.attr("msg_index")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// A `{denom, amount_base}` pair extracted from an event attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAmount {
    pub denom: String,
    pub amount_base: String,
}

/// Decode a possibly-base64 attribute string.
///
/// Only accepts the decode when it round-trips back to the original and the
/// decoded bytes are printable ASCII; anything else is passed through
/// untouched.
pub fn decode_attr(raw: &str) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    match engine.decode(raw) {
        Ok(bytes) => {
            let printable = !bytes.is_empty()
                && bytes.iter().all(|b| (0x20..=0x7e).contains(b));
            if printable && engine.encode(&bytes) == raw {
                String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string())
            } else {
                raw.to_string()
            }
        },
        Err(_) => raw.to_string(),
    }
}

/// Extract all events of a tx result into decoded views.
pub fn events_from_tx(tx_result: &Value) -> Vec<EventView> {
    let Some(events) = tx_result["events"].as_array() else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let ty = event["type"].as_str()?.to_string();
            let mut attrs = FxHashMap::default();
            if let Some(raw_attrs) = event["attributes"].as_array() {
                for attr in raw_attrs {
                    let key = attr["key"].as_str().map(decode_attr);
                    let value = attr["value"].as_str().map(decode_attr);
                    if let (Some(key), Some(value)) = (key, value) {
                        attrs.insert(key, value);
                    }
                }
            }
            Some(EventView { ty, attrs })
        })
        .collect()
}

/// All events of one type.
pub fn by_type<'a>(events: &'a [EventView], ty: &str) -> Vec<&'a EventView> {
    events.iter().filter(|e| e.ty == ty).collect()
}

/// Wasm events whose `action` attribute equals the given string.
pub fn wasm_by_action<'a>(events: &'a [EventView], action: &str) -> Vec<&'a EventView> {
    events
        .iter()
        .filter(|e| e.ty == "wasm" && e.attr("action") == Some(action))
        .collect()
}

/// Map message index -> signer from `message` events.
pub fn msg_sender_by_index(events: &[EventView]) -> FxHashMap<i32, String> {
    let mut senders = FxHashMap::default();
    let mut running = 0;
    for event in events.iter().filter(|e| e.ty == "message") {
        if let Some(sender) = event.attr("sender") {
            let index = event
                .attr("msg_index")
                .and_then(|v| v.parse().ok())
                .unwrap_or(running);
            senders.entry(index).or_insert_with(|| sender.to_string());
            running += 1;
        }
    }
    senders
}

/// Split a `BASE-QUOTE` pair string into `(base, quote)`.
///
/// If either side equals the native denom, that side becomes the quote
/// regardless of position; otherwise the string order is kept.
pub fn parse_pair(pair: &str, native_denom: &str) -> Option<(String, String)> {
    if let Some(base) = pair.strip_suffix(&format!("-{}", native_denom)) {
        if !base.is_empty() {
            return Some((base.to_string(), native_denom.to_string()));
        }
    }
    if let Some(base) = pair.strip_prefix(&format!("{}-", native_denom)) {
        if !base.is_empty() {
            return Some((base.to_string(), native_denom.to_string()));
        }
    }

    let (base, quote) = pair.split_once('-')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base.to_string(), quote.to_string()))
}

/// Parse `denom:amount,denom:amount` reserve attributes.
pub fn parse_reserves_kv(s: &str) -> Vec<AssetAmount> {
    s.split(',')
        .filter_map(|part| {
            let (denom, amount) = part.trim().split_once(':')?;
            if denom.is_empty() || amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            Some(AssetAmount {
                denom: denom.to_string(),
                amount_base: amount.to_string(),
            })
        })
        .collect()
}

/// Parse `"<amount><denom>,<amount><denom>"` asset lists (amount is the
/// leading digit run, denom is the remainder).
pub fn parse_assets_list(s: &str) -> Vec<AssetAmount> {
    s.split(',')
        .filter_map(|part| {
            let part = part.trim();
            let split_at = part.find(|c: char| !c.is_ascii_digit())?;
            if split_at == 0 {
                return None;
            }
            let (amount, denom) = part.split_at(split_at);
            Some(AssetAmount {
                denom: denom.to_string(),
                amount_base: amount.to_string(),
            })
        })
        .collect()
}

/// A swap that offers the quote asset is buying the base asset.
pub fn classify_direction(offer_denom: &str, quote_denom: &str) -> TradeDirection {
    if offer_denom == quote_denom {
        TradeDirection::Buy
    } else {
        TradeDirection::Sell
    }
}

/// Extract `(base_raw, quote_raw)` reserve amounts from a `{"pool":{}}`
/// smart-query response, matching assets to the pool's denoms. Handles both
/// `native_token` and cw20 `token` asset infos.
pub fn parse_pool_reserves(
    response: &Value,
    base_denom: &str,
    quote_denom: &str,
) -> Option<(String, String)> {
    let assets = response["data"]["assets"]
        .as_array()
        .or_else(|| response["assets"].as_array())?;

    let mut base_raw: Option<String> = None;
    let mut quote_raw: Option<String> = None;

    for asset in assets {
        let denom = asset["info"]["native_token"]["denom"]
            .as_str()
            .or_else(|| asset["info"]["token"]["contract_addr"].as_str())
            .or_else(|| asset["denom"].as_str())?;
        let amount = asset["amount"].as_str()?;

        if denom == base_denom {
            base_raw = Some(amount.to_string());
        } else if denom == quote_denom {
            quote_raw = Some(amount.to_string());
        }
    }

    match (base_raw, quote_raw) {
        (Some(b), Some(q)) => Some((b, q)),
        _ => None,
    }
}

/// Transaction hash: uppercase hex SHA-256 over the decoded tx bytes.
pub fn tx_hash(raw_base64_tx: &str) -> anyhow::Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw_base64_tx)
        .map_err(|e| anyhow::anyhow!("Invalid base64 tx: {}", e))?;
    let digest = Sha256::digest(&bytes);
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{:02X}", b));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn attr_decode_requires_round_trip() {
        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = engine.encode("pair_contract_addr");
        assert_eq!(decode_attr(&encoded), "pair_contract_addr");

        // Plain strings that happen to be valid base64 of non-printable
        // bytes stay as-is.
        assert_eq!(decode_attr("swap"), "swap");
        assert_eq!(decode_attr("uzig"), "uzig");
        assert_eq!(decode_attr("not base64!"), "not base64!");
    }

    #[test]
    fn pair_native_side_becomes_quote() {
        assert_eq!(
            parse_pair("TKN-uzig", "uzig"),
            Some(("TKN".into(), "uzig".into()))
        );
        assert_eq!(
            parse_pair("uzig-TKN", "uzig"),
            Some(("TKN".into(), "uzig".into()))
        );
        assert_eq!(
            parse_pair("AAA-BBB", "uzig"),
            Some(("AAA".into(), "BBB".into()))
        );
        assert_eq!(parse_pair("nodash", "uzig"), None);
    }

    #[test]
    fn reserves_kv_parses_pairs() {
        let parsed = parse_reserves_kv("TKN:760000000,uzig:2500000");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].denom, "TKN");
        assert_eq!(parsed[0].amount_base, "760000000");
        assert_eq!(parsed[1].denom, "uzig");
        assert_eq!(parsed[1].amount_base, "2500000");

        assert!(parse_reserves_kv("garbage").is_empty());
        assert!(parse_reserves_kv("TKN:12x").is_empty());
    }

    #[test]
    fn assets_list_splits_amount_prefix() {
        let parsed = parse_assets_list("1000000000TKN,2000000uzig");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].amount_base, "1000000000");
        assert_eq!(parsed[0].denom, "TKN");
        assert_eq!(parsed[1].amount_base, "2000000");
        assert_eq!(parsed[1].denom, "uzig");

        // factory denoms keep their full path
        let parsed = parse_assets_list("5factory/zig1abc/coin");
        assert_eq!(parsed[0].denom, "factory/zig1abc/coin");
    }

    #[test]
    fn direction_buy_iff_offer_is_quote() {
        assert_eq!(classify_direction("uzig", "uzig"), TradeDirection::Buy);
        assert_eq!(classify_direction("TKN", "uzig"), TradeDirection::Sell);
    }

    #[test]
    fn tx_hash_is_uppercase_sha256() {
        let engine = base64::engine::general_purpose::STANDARD;
        let raw = engine.encode(b"hello");
        let hash = tx_hash(&raw).unwrap();
        assert_eq!(
            hash,
            "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"
        );
    }

    #[test]
    fn pool_reserves_match_denoms() {
        let response = serde_json::json!({
            "data": {
                "assets": [
                    {"info": {"native_token": {"denom": "uzig"}}, "amount": "2500000"},
                    {"info": {"token": {"contract_addr": "zig1tkn"}}, "amount": "760000000"}
                ]
            }
        });

        let (base, quote) = parse_pool_reserves(&response, "zig1tkn", "uzig").unwrap();
        assert_eq!(base, "760000000");
        assert_eq!(quote, "2500000");

        assert!(parse_pool_reserves(&response, "other", "uzig").is_none());
    }

    #[test]
    fn events_extracted_with_decoded_attrs() {
        let engine = base64::engine::general_purpose::STANDARD;
        let tx = serde_json::json!({
            "events": [
                {
                    "type": "wasm",
                    "attributes": [
                        {"key": engine.encode("action"), "value": engine.encode("swap")},
                        {"key": "_contract_address", "value": "zig1pair"}
                    ]
                },
                {"type": "message", "attributes": [{"key": "sender", "value": "zig1signer"}]}
            ]
        });

        let events = events_from_tx(&tx);
        assert_eq!(events.len(), 2);
        let swaps = wasm_by_action(&events, "swap");
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].contract_address(), Some("zig1pair"));

        let senders = msg_sender_by_index(&events);
        assert_eq!(senders.get(&0).map(|s| s.as_str()), Some("zig1signer"));
    }
}

use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use rand::Rng;
use serde_json::Value;
use url::Url;

use crate::config::ChainSettings;

/// Non-retryable HTTP status carried through `anyhow` so callers can react
/// to specific codes (the holders sweeper skips tokens on 501).
#[derive(Debug, Clone, Copy)]
pub struct HttpStatusError(pub u16);

impl std::fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP status {}", self.0)
    }
}

impl std::error::Error for HttpStatusError {}

/// Total attempts across the endpoint list before a call gives up.
const MAX_ATTEMPTS: u32 = 6;

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// JSON client for the chain's RPC and LCD endpoints.
///
/// Each call walks the configured endpoint list round-robin. 429 and 5xx
/// responses (and transport errors) retry with jittered exponential backoff;
/// any other 4xx fails fast. Wrappers return raw JSON trees - interpretation
/// belongs to the caller.
#[derive(Clone)]
pub struct ChainClient {
    http: reqwest::Client,
    rpc_endpoints: Vec<String>,
    lcd_endpoints: Vec<String>,
}

impl ChainClient {
    pub fn new(settings: &ChainSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        let rpc_endpoints = settings.rpc_endpoints();
        let lcd_endpoints = settings.lcd_endpoints();
        anyhow::ensure!(!rpc_endpoints.is_empty(), "No RPC endpoints configured");
        anyhow::ensure!(!lcd_endpoints.is_empty(), "No LCD endpoints configured");
        for endpoint in rpc_endpoints.iter().chain(&lcd_endpoints) {
            Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL {}", endpoint))?;
        }

        Ok(Self {
            http,
            rpc_endpoints,
            lcd_endpoints,
        })
    }

    /// Shared HTTP client for one-off fetches (metadata URIs).
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }

    async fn get_json(&self, endpoints: &[String], path: &str) -> anyhow::Result<Value> {
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..MAX_ATTEMPTS {
            let endpoint = &endpoints[attempt as usize % endpoints.len()];
            let url = format!("{}{}", endpoint, path);

            match self.http.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == 429 || status >= 500 {
                        last_error = Some(anyhow::anyhow!("{} from {}", status, endpoint));
                    } else if status >= 400 {
                        return Err(anyhow::Error::new(HttpStatusError(status))
                            .context(format!("GET {}", url)));
                    } else {
                        return resp
                            .json::<Value>()
                            .await
                            .with_context(|| format!("Malformed JSON from {}", url));
                    }
                },
                Err(e) => {
                    last_error = Some(anyhow::Error::from(e).context(format!("GET {}", url)));
                },
            }

            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Request failed"))
            .context(format!("Exhausted {} attempts for {}", MAX_ATTEMPTS, path)))
    }

    // ==================== RPC ====================

    /// Latest block height from `/status`.
    pub async fn status(&self) -> anyhow::Result<u64> {
        let json = self.get_json(&self.rpc_endpoints, "/status").await?;
        json["result"]["sync_info"]["latest_block_height"]
            .as_str()
            .and_then(|h| h.parse().ok())
            .context("Missing latest_block_height in /status response")
    }

    pub async fn block(&self, height: u64) -> anyhow::Result<Value> {
        self.get_json(&self.rpc_endpoints, &format!("/block?height={}", height))
            .await
    }

    pub async fn block_results(&self, height: u64) -> anyhow::Result<Value> {
        self.get_json(
            &self.rpc_endpoints,
            &format!("/block_results?height={}", height),
        )
        .await
    }

    // ==================== LCD ====================

    pub async fn denom_metadata(&self, denom: &str) -> anyhow::Result<Value> {
        self.get_json(
            &self.lcd_endpoints,
            &format!("/cosmos/bank/v1beta1/denoms_metadata/{}", encode_segment(denom)),
        )
        .await
    }

    pub async fn factory_denom(&self, denom: &str) -> anyhow::Result<Value> {
        self.get_json(
            &self.lcd_endpoints,
            &format!("/zigchain/factory/denom/{}", encode_segment(denom)),
        )
        .await
    }

    /// One page of token ownership. `page_key` is the opaque pagination key
    /// from the previous page.
    pub async fn denom_owners(
        &self,
        denom: &str,
        page_key: Option<&str>,
    ) -> anyhow::Result<Value> {
        let mut path = format!(
            "/cosmos/bank/v1beta1/denom_owners/{}",
            encode_segment(denom)
        );
        if let Some(key) = page_key {
            path.push_str(&format!("?pagination.key={}", encode_segment(key)));
        }
        self.get_json(&self.lcd_endpoints, &path).await
    }

    /// Resolve an `ibc/HASH` denom trace. Pass the bare hash.
    pub async fn ibc_denom_trace(&self, hash: &str) -> anyhow::Result<Value> {
        self.get_json(
            &self.lcd_endpoints,
            &format!("/ibc/apps/transfer/v1/denoms/ibc/{}", encode_segment(hash)),
        )
        .await
    }

    /// CosmWasm smart query; `msg` is serialized and base64-encoded into the
    /// path as the LCD expects.
    pub async fn smart_query(&self, contract: &str, msg: &Value) -> anyhow::Result<Value> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(msg.to_string());
        self.get_json(
            &self.lcd_endpoints,
            &format!(
                "/cosmwasm/wasm/v1/contract/{}/smart/{}",
                contract,
                encode_segment(&encoded)
            ),
        )
        .await
    }

    /// Live pool reserves via `{"pool":{}}`.
    pub async fn query_pool(&self, pair_contract: &str) -> anyhow::Result<Value> {
        self.smart_query(pair_contract, &serde_json::json!({"pool": {}}))
            .await
    }
}

/// Jittered exponential backoff: min(1000 * 1.5^n, 10000) + U[0, 250) ms.
fn backoff_delay(attempt: u32) -> Duration {
    let base = (1000.0 * 1.5_f64.powi(attempt as i32)).min(10_000.0) as u64;
    let jitter = rand::thread_rng().gen_range(0..250);
    Duration::from_millis(base + jitter)
}

/// Percent-encode a path segment (denoms contain `/`, pagination keys are
/// base64 with `+` and `=`).
fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            },
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        for attempt in 0..8 {
            let d = backoff_delay(attempt).as_millis() as u64;
            let base = (1000.0 * 1.5_f64.powi(attempt as i32)).min(10_000.0) as u64;
            assert!(d >= base && d < base + 250, "attempt {}: {}ms", attempt, d);
        }
    }

    #[test]
    fn segments_are_encoded() {
        assert_eq!(encode_segment("uzig"), "uzig");
        assert_eq!(
            encode_segment("factory/zig1abc/coin"),
            "factory%2Fzig1abc%2Fcoin"
        );
        assert_eq!(encode_segment("Ab+c="), "Ab%2Bc%3D");
    }
}

use chrono::{DateTime, Utc};

/// AMM pair contract flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairType {
    Xyk,
    Concentrated,
    CustomConcentrated,
}

impl PairType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairType::Xyk => "xyk",
            PairType::Concentrated => "concentrated",
            PairType::CustomConcentrated => "custom-concentrated",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "concentrated" => PairType::Concentrated,
            "custom-concentrated" => PairType::CustomConcentrated,
            _ => PairType::Xyk,
        }
    }
}

/// AMM pair metadata (PostgreSQL).
///
/// Created by the block processor on `create_pair`, rarely mutated after.
/// Token exponents are denormalized onto the row at read time (JOIN against
/// tokens) so the hot swap path never does a second lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Pool {
    pub id: i64,
    pub pair_contract: String,

    pub base_token_id: i64,
    pub quote_token_id: i64,
    pub base_denom: String,
    pub quote_denom: String,
    pub lp_denom: Option<String>,

    #[serde(skip)]
    pub pair_type: PairType,
    /// True iff `quote_denom` is the chain's native denom.
    pub is_native_quote: bool,

    pub factory_addr: Option<String>,
    pub router_addr: Option<String>,

    pub created_height: Option<i64>,
    pub created_tx: Option<String>,
    pub created_signer: Option<String>,
    pub created_at: Option<DateTime<Utc>>,

    // Denormalized from tokens on read; not persisted on the pools row.
    #[serde(skip)]
    pub base_exponent: Option<i16>,
    #[serde(skip)]
    pub quote_exponent: Option<i16>,
}

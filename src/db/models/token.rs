use chrono::{DateTime, Utc};

/// Asset classification by denom shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Native,
    Factory,
    Ibc,
    Cw20,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Native => "native",
            TokenKind::Factory => "factory",
            TokenKind::Ibc => "ibc",
            TokenKind::Cw20 => "cw20",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "factory" => TokenKind::Factory,
            "ibc" => TokenKind::Ibc,
            "cw20" => TokenKind::Cw20,
            _ => TokenKind::Native,
        }
    }

    /// Classify a denom by its on-chain shape.
    pub fn classify(denom: &str) -> Self {
        if denom.starts_with("ibc/") {
            TokenKind::Ibc
        } else if denom.starts_with("factory/") {
            TokenKind::Factory
        } else if denom.starts_with("zig1") {
            TokenKind::Cw20
        } else {
            TokenKind::Native
        }
    }
}

/// Token metadata and supply state (PostgreSQL).
///
/// Created as a minimal stub on first sighting; enriched by the metadata
/// resolver with never-clobber-with-null semantics; never deleted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Token {
    pub id: i64,
    pub denom: String,
    #[serde(skip)]
    pub kind: TokenKind,

    // Display metadata (discretionary, resolver-owned)
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub display: Option<String>,
    pub image: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub description: Option<String>,

    /// Display exponent: DISPLAY = BASE / 10^exponent. None until resolved;
    /// price/candle paths skip tokens with an unknown exponent.
    pub exponent: Option<i16>,

    // Supply in base units (78-digit safe, carried as strings)
    pub max_supply_base: Option<String>,
    pub total_supply_base: Option<String>,
    pub minting_cap_base: Option<String>,
    pub can_change_minting_cap: Option<bool>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Minimal stub for a denom seen for the first time.
    pub fn stub(denom: &str) -> Self {
        Self {
            id: 0,
            denom: denom.to_string(),
            kind: TokenKind::classify(denom),
            name: None,
            symbol: None,
            display: None,
            image: None,
            website: None,
            twitter: None,
            telegram: None,
            description: None,
            exponent: None,
            max_supply_base: None,
            total_supply_base: None,
            minting_cap_base: None,
            can_change_minting_cap: None,
            updated_at: None,
        }
    }
}

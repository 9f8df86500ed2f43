use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Swap,
    Provide,
    Withdraw,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Swap => "swap",
            TradeAction::Provide => "provide",
            TradeAction::Withdraw => "withdraw",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
    Provide,
    Withdraw,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
            TradeDirection::Provide => "provide",
            TradeDirection::Withdraw => "withdraw",
        }
    }
}

/// Immutable trade event record (time-partitioned monthly).
///
/// Natural key: `(created_at, tx_hash, pool_id, msg_index)`; replays are
/// dropped by the writer's ON CONFLICT DO NOTHING.
#[derive(Debug, Clone)]
pub struct Trade {
    pub created_at: DateTime<Utc>,
    pub tx_hash: String,
    pub pool_id: i64,
    pub msg_index: i32,

    pub action: TradeAction,
    pub direction: TradeDirection,

    pub offer_denom: Option<String>,
    pub offer_amount_base: Option<String>,
    pub ask_denom: Option<String>,
    pub return_amount_base: Option<String>,

    // Reserves observed in the event payload, when present
    pub reserve_base_base: Option<String>,
    pub reserve_quote_base: Option<String>,

    pub height: i64,
    pub signer: Option<String>,
    pub is_router: bool,
}

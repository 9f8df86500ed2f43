use serde::{Deserialize, Serialize};

/// Typed parameter payloads for the alert schema.
///
/// The alert engine itself lives outside this process; rows are written with
/// a `kind` discriminator plus a JSON params blob, and this union keeps the
/// blob strongly typed on the Rust side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertParams {
    PriceCross {
        pool_id: i64,
        threshold_native: f64,
        /// True = trigger when crossing upward, false = downward.
        above: bool,
    },
    WalletTrade {
        address: String,
        pool_id: Option<i64>,
    },
    LargeTrade {
        pool_id: i64,
        min_quote_display: f64,
    },
    TvlChange {
        pool_id: i64,
        pct_change: f64,
        window_minutes: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_round_trip_with_kind_tag() {
        let params = AlertParams::LargeTrade {
            pool_id: 7,
            min_quote_display: 2500.0,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["kind"], "large_trade");
        let back: AlertParams = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}

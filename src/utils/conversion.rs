//! Unit math on chain amounts.
//!
//! Base-unit amounts are 78-digit integers carried as strings; DISPLAY
//! values are `f64` obtained by dividing through 10^exponent. BigDecimal is
//! used for the division so amounts beyond 2^53 do not lose their magnitude.

use bigdecimal::BigDecimal;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use std::str::FromStr;

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// 10^exp as BigDecimal.
pub fn pow10(exp: u32) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp))
    }
}

/// Parse a base-unit amount string into display units (`amount / 10^exp`).
///
/// Returns None for unparseable, negative, or non-finite results.
pub fn base_str_to_display(amount_base: &str, exponent: u32) -> Option<f64> {
    let value = BigDecimal::from_str(amount_base.trim()).ok()?;
    let adjusted = value / pow10(exponent);
    let result = adjusted.to_f64()?;

    if result.is_finite() && result >= 0.0 {
        Some(result)
    } else {
        None
    }
}

/// Display conversion with an optional exponent, defaulting to 6 when the
/// token's exponent is unresolved (rollup paths only; price paths require a
/// known exponent and skip instead).
pub fn display_amount(amount_base: &str, exponent: Option<i16>) -> f64 {
    let exp = exponent.unwrap_or(6).max(0) as u32;
    base_str_to_display(amount_base, exp).unwrap_or(0.0)
}

/// Floor a timestamp to its minute bucket.
pub fn floor_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn display_conversion_divides_by_exponent() {
        assert_eq!(base_str_to_display("2000000", 6), Some(2.0));
        assert_eq!(base_str_to_display("1000000000", 6), Some(1000.0));
        assert_eq!(base_str_to_display("5", 0), Some(5.0));
    }

    #[test]
    fn display_conversion_handles_78_digit_amounts() {
        let huge = "9".repeat(78);
        let v = base_str_to_display(&huge, 18).unwrap();
        assert!(v > 1e59 && v < 1e60);
    }

    #[test]
    fn display_conversion_rejects_garbage() {
        assert_eq!(base_str_to_display("abc", 6), None);
        assert_eq!(base_str_to_display("-5", 6), None);
    }

    #[test]
    fn minute_floor_drops_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 45).unwrap();
        let floored = floor_minute(ts);
        assert_eq!(floored, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }
}

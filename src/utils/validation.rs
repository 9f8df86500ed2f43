//! Validation helpers for prices and backend identifiers.

/// Bounds beyond which a computed price is discarded as corrupt input
/// rather than stored.
const MIN_PRICE: f64 = 1e-18;
const MAX_PRICE: f64 = 1e18;

/// Validate a computed price: finite, positive, within sane bounds.
pub fn validate_price(price: f64) -> Option<f64> {
    if price.is_finite() && price >= MIN_PRICE && price <= MAX_PRICE {
        Some(price)
    } else {
        None
    }
}

/// LISTEN/NOTIFY channel names cannot be parameterized in SQL, so anything
/// interpolated must match `^[a-z_][a-z0-9_]*$`.
pub fn valid_channel_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_bounds() {
        assert_eq!(validate_price(0.002), Some(0.002));
        assert_eq!(validate_price(0.0), None);
        assert_eq!(validate_price(f64::NAN), None);
        assert_eq!(validate_price(f64::INFINITY), None);
        assert_eq!(validate_price(-1.0), None);
        assert_eq!(validate_price(1e19), None);
    }

    #[test]
    fn channel_names() {
        assert!(valid_channel_name("pair_created"));
        assert!(valid_channel_name("_internal2"));
        assert!(!valid_channel_name("PairCreated"));
        assert!(!valid_channel_name("9lives"));
        assert!(!valid_channel_name("drop table;"));
        assert!(!valid_channel_name(""));
    }
}

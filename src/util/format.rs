//! Number formatting utilities.

use rust_decimal::{Decimal, RoundingStrategy};

/// Format a credit amount with four decimal places.
#[must_use]
pub fn format_credits(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.4}")
}

/// Format a per-1K-token price, or "free" for zero.
#[must_use]
pub fn format_price(value: Decimal) -> String {
    if value.is_zero() {
        "free".to_string()
    } else {
        format!("{}/1K", value.normalize())
    }
}

/// Format a token count with a K/M suffix.
#[must_use]
pub fn format_tokens(value: u64) -> String {
    fn format_compact(value: u64, divisor: u64, suffix: &str) -> String {
        let major = value / divisor;
        let minor = (value % divisor) / (divisor / 10);
        format!("{major}.{minor}{suffix}")
    }

    if value >= 1_000_000 {
        format_compact(value, 1_000_000, "M")
    } else if value >= 1_000 {
        format_compact(value, 1_000, "K")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn format_tokens_millions() {
        assert_eq!(format_tokens(1_048_576), "1.0M");
    }

    #[test]
    fn format_tokens_thousands() {
        assert_eq!(format_tokens(12_500), "12.5K");
    }

    #[test]
    fn format_tokens_small() {
        assert_eq!(format_tokens(500), "500");
    }

    #[test]
    fn credits_use_four_places() {
        assert_eq!(format_credits(dec!(1.5)), "1.5000");
        assert_eq!(format_credits(dec!(0.00005)), "0.0001");
    }

    #[test]
    fn zero_price_reads_free() {
        assert_eq!(format_price(Decimal::ZERO), "free");
        assert_eq!(format_price(dec!(0.00250)), "0.0025/1K");
    }
}

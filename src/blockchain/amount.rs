// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decimal amount parsing and formatting.
//!
//! Amounts travel as decimal strings ("1.5") and are scaled to the token's
//! base units (lamports, wei, token units). Amounts with more fractional
//! digits than the token supports are rejected rather than truncated, so the
//! value that is signed is always exactly the value the user typed.

/// Amount validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount is required")]
    Empty,

    #[error("Invalid amount format")]
    Malformed,

    #[error("Amount must be greater than zero")]
    Zero,

    #[error("Too many decimal places (max {max})")]
    TooPrecise { max: u8 },

    #[error("Amount overflow")]
    Overflow,
}

/// Parse a human-readable amount into base units.
///
/// Trailing fractional zeros are ignored ("1.50" with 1 decimal is fine).
/// Zero, negative, exponent and over-precise inputs are all rejected.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<u128, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole_str, frac_str) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole_str.is_empty() && frac_str.is_empty() {
        return Err(AmountError::Malformed);
    }
    if !whole_str.chars().all(|c| c.is_ascii_digit())
        || !frac_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AmountError::Malformed);
    }

    let frac_str = frac_str.trim_end_matches('0');
    if frac_str.len() > decimals as usize {
        return Err(AmountError::TooPrecise { max: decimals });
    }

    let whole = if whole_str.is_empty() {
        0u128
    } else {
        whole_str
            .parse::<u128>()
            .map_err(|_| AmountError::Overflow)?
    };

    let fraction = if frac_str.is_empty() {
        0u128
    } else {
        // Pad with zeros to match decimals
        let padded = format!("{:0<width$}", frac_str, width = decimals as usize);
        padded.parse::<u128>().map_err(|_| AmountError::Overflow)?
    };

    let multiplier = 10u128
        .checked_pow(decimals as u32)
        .ok_or(AmountError::Overflow)?;
    let total = whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(fraction))
        .ok_or(AmountError::Overflow)?;

    if total == 0 {
        return Err(AmountError::Zero);
    }
    Ok(total)
}

/// Format base units as a normalised decimal string.
pub fn format_amount(amount: u128, decimals: u8) -> String {
    if amount == 0 {
        return "0".to_string();
    }

    let Some(divisor) = 10u128.checked_pow(decimals as u32) else {
        return amount.to_string();
    };
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder == 0 {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        format!("{}.{}", whole, decimal_str.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_whole() {
        assert_eq!(parse_amount("1", 9).unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_parse_amount_decimal() {
        assert_eq!(parse_amount("1.5", 18).unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(parse_amount("0.001", 9).unwrap(), 1_000_000);
        assert_eq!(parse_amount(".5", 6).unwrap(), 500_000);
    }

    #[test]
    fn test_parse_amount_usdc() {
        // 1.5 USDC = 1_500_000 (6 decimals)
        assert_eq!(parse_amount("1.5", 6).unwrap(), 1_500_000);
    }

    #[test]
    fn test_parse_amount_zero_rejected() {
        assert_eq!(parse_amount("0", 9), Err(AmountError::Zero));
        assert_eq!(parse_amount("0.000", 6), Err(AmountError::Zero));
    }

    #[test]
    fn test_parse_amount_over_precision_rejected() {
        assert_eq!(
            parse_amount("0.0000001", 6),
            Err(AmountError::TooPrecise { max: 6 })
        );
        // trailing zeros do not count
        assert_eq!(parse_amount("1.500000000", 6).unwrap(), 1_500_000);
    }

    #[test]
    fn test_parse_amount_malformed() {
        for input in ["", "abc", "1.2.3", "-1", "1e9", ".", "1,5", "+2"] {
            assert!(parse_amount(input, 9).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_parse_amount_overflow() {
        assert_eq!(
            parse_amount("999999999999999999999999999999", 18),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_000_000_000, 9), "1");
        assert_eq!(format_amount(1_500_000, 6), "1.5");
        assert_eq!(format_amount(1, 9), "0.000000001");
        assert_eq!(format_amount(0, 18), "0");
        assert_eq!(format_amount(42, 0), "42");
    }
}

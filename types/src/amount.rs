//! Atomic-unit amount handling.
//!
//! Currency amounts are `u64` atomic units with 8 decimal digits of
//! precision ([`COIN`] atomic units to one coin). Decimal strings only ever
//! cross the boundary through [`parse_amount`]/[`format_amount`], so no
//! float representation can leak into a hash pre-image.

//---------------------------------------------------------------------------------------------------- Constants
/// Decimal digits of precision.
pub const DECIMALS: u32 = 8;

/// Atomic units per coin.
pub const COIN: u64 = 100_000_000;

//---------------------------------------------------------------------------------------------------- AmountError
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is not a valid decimal number")]
    Invalid,
    #[error("amount has more than {DECIMALS} decimal digits")]
    TooManyDecimals,
    #[error("amount overflows the atomic-unit range")]
    Overflow,
}

//---------------------------------------------------------------------------------------------------- Functions
/// Parses a decimal coin amount (`"3.0"`, `"0.00000001"`) into atomic units.
pub fn parse_amount(s: &str) -> Result<u64, AmountError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountError::Invalid);
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(AmountError::Invalid);
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AmountError::Invalid);
    }
    if frac_part.len() > DECIMALS as usize {
        return Err(AmountError::TooManyDecimals);
    }

    let int: u64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| AmountError::Overflow)?
    };

    // Right-pad the fraction to exactly `DECIMALS` digits.
    let mut frac: u64 = 0;
    if !frac_part.is_empty() {
        frac = frac_part.parse().map_err(|_| AmountError::Overflow)?;
        frac *= 10u64.pow(DECIMALS - u32::try_from(frac_part.len()).unwrap_or(DECIMALS));
    }

    int.checked_mul(COIN)
        .and_then(|v| v.checked_add(frac))
        .ok_or(AmountError::Overflow)
}

/// Formats atomic units as a fixed 8-decimal coin amount.
pub fn format_amount(amount: u64) -> String {
    format!("{}.{:08}", amount / COIN, amount % COIN)
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse() {
        assert_eq!(parse_amount("3.0"), Ok(3 * COIN));
        assert_eq!(parse_amount("3"), Ok(3 * COIN));
        assert_eq!(parse_amount("0.00000001"), Ok(1));
        assert_eq!(parse_amount(".5"), Ok(COIN / 2));
        assert_eq!(parse_amount("10.00000000"), Ok(10 * COIN));
    }

    #[test]
    fn parse_rejects() {
        assert_eq!(parse_amount(""), Err(AmountError::Invalid));
        assert_eq!(parse_amount("."), Err(AmountError::Invalid));
        assert_eq!(parse_amount("-1"), Err(AmountError::Invalid));
        assert_eq!(parse_amount("1e8"), Err(AmountError::Invalid));
        assert_eq!(
            parse_amount("0.000000001"),
            Err(AmountError::TooManyDecimals)
        );
        assert_eq!(
            parse_amount("999999999999999999999"),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn format() {
        assert_eq!(format_amount(3 * COIN), "3.00000000");
        assert_eq!(format_amount(1), "0.00000001");
        assert_eq!(format_amount(COIN + COIN / 2), "1.50000000");
    }

    #[test]
    fn round_trip() {
        for amount in [0, 1, COIN, 7 * COIN + 123, u64::MAX / COIN * COIN] {
            assert_eq!(parse_amount(&format_amount(amount)), Ok(amount));
        }
    }
}

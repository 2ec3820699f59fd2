//! Conversion between ether-scale decimals and native integer units (wei).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Native integer amount (wei)
pub type Wei = u128;

/// Fractional digits of one whole unit (1 ETH = 10^18 wei)
pub const ETHER_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("not a decimal number: {0}")]
    Parse(String),
    #[error("negative amount: {0}")]
    Negative(Decimal),
    #[error("amount {0} has more than {ETHER_DECIMALS} fractional digits")]
    TooPrecise(Decimal),
    #[error("amount {0} does not fit the native unit range")]
    Overflow(String),
}

fn wei_per_ether() -> Decimal {
    Decimal::from_i128_with_scale(1_000_000_000_000_000_000, 0)
}

/// Parse `"1.5"` into wei
pub fn parse_ether(input: &str) -> Result<Wei, UnitsError> {
    let value: Decimal = input
        .trim()
        .parse()
        .map_err(|_| UnitsError::Parse(input.to_string()))?;
    to_wei(value)
}

/// Convert an ether-scale decimal into wei without rounding
pub fn to_wei(value: Decimal) -> Result<Wei, UnitsError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(UnitsError::Negative(value));
    }
    let normalized = value.normalize();
    if normalized.scale() > ETHER_DECIMALS {
        return Err(UnitsError::TooPrecise(value));
    }
    let scaled = normalized
        .checked_mul(wei_per_ether())
        .ok_or_else(|| UnitsError::Overflow(value.to_string()))?;
    scaled
        .to_u128()
        .ok_or_else(|| UnitsError::Overflow(value.to_string()))
}

/// Render wei as an ether-scale decimal with trailing zeros removed
pub fn format_ether(wei: Wei) -> Result<Decimal, UnitsError> {
    let signed = i128::try_from(wei).map_err(|_| UnitsError::Overflow(wei.to_string()))?;
    Decimal::try_from_i128_with_scale(signed, ETHER_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|_| UnitsError::Overflow(wei.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("1").unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(parse_ether("1.5").unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(parse_ether("0.000000000000000001").unwrap(), 1);
        assert_eq!(parse_ether(" 0 ").unwrap(), 0);
    }

    #[test]
    fn test_parse_ether_rejects_bad_input() {
        assert!(matches!(parse_ether("abc"), Err(UnitsError::Parse(_))));
        assert!(matches!(parse_ether("-1"), Err(UnitsError::Negative(_))));
        assert!(matches!(
            parse_ether("0.0000000000000000001"),
            Err(UnitsError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        assert_eq!(to_wei(dec!(2.50000000000000000000)).unwrap(), 2_500_000_000_000_000_000);
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(1_500_000_000_000_000_000).unwrap(), dec!(1.5));
        assert_eq!(format_ether(0).unwrap(), Decimal::ZERO);
        assert_eq!(format_ether(1).unwrap(), dec!(0.000000000000000001));
        assert_eq!(format_ether(parse_ether("3.1400").unwrap()).unwrap().to_string(), "3.14");
    }

    #[test]
    fn test_format_ether_overflow() {
        assert!(format_ether(u128::MAX).is_err());
    }
}

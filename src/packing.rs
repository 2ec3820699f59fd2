//! Packed decimal-float encoding used by rollup transactions.
//!
//! Amounts travel as `mantissa * 10^exponent` with a 35-bit mantissa and a
//! 5-bit exponent; fees use an 11-bit mantissa and a 5-bit exponent. Values
//! that do not fit are rounded toward zero to the closest representable
//! value, never up.

use crate::units::Wei;

pub const AMOUNT_MANTISSA_BITS: u32 = 35;
pub const AMOUNT_EXPONENT_BITS: u32 = 5;
pub const FEE_MANTISSA_BITS: u32 = 11;
pub const FEE_EXPONENT_BITS: u32 = 5;

/// Split `value` into the largest (mantissa, exponent) pair whose product
/// does not exceed it.
fn decompose(value: Wei, mantissa_bits: u32, exponent_bits: u32) -> (Wei, u32) {
    let max_mantissa: Wei = (1u128 << mantissa_bits) - 1;
    let max_exponent: u32 = (1u32 << exponent_bits) - 1;

    let mut mantissa = value;
    let mut exponent = 0u32;
    while mantissa > max_mantissa && exponent < max_exponent {
        mantissa /= 10;
        exponent += 1;
    }
    // Beyond the encodable range: saturate at the largest value.
    (mantissa.min(max_mantissa), exponent)
}

fn closest_packable(value: Wei, mantissa_bits: u32, exponent_bits: u32) -> Wei {
    let (mantissa, exponent) = decompose(value, mantissa_bits, exponent_bits);
    mantissa * 10u128.pow(exponent)
}

/// Closest transaction amount not above `amount` that packs exactly
pub fn closest_packable_amount(amount: Wei) -> Wei {
    closest_packable(amount, AMOUNT_MANTISSA_BITS, AMOUNT_EXPONENT_BITS)
}

/// Closest fee not above `fee` that packs exactly
pub fn closest_packable_fee(fee: Wei) -> Wei {
    closest_packable(fee, FEE_MANTISSA_BITS, FEE_EXPONENT_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::parse_ether;

    #[test]
    fn test_round_values_pack_exactly() {
        let one_and_half = parse_ether("1.5").unwrap();
        assert_eq!(closest_packable_amount(one_and_half), one_and_half);

        let fee = parse_ether("0.0001").unwrap();
        assert_eq!(closest_packable_fee(fee), fee);
    }

    #[test]
    fn test_small_values_untouched() {
        assert_eq!(closest_packable_amount(0), 0);
        assert_eq!(closest_packable_amount(123), 123);
        assert_eq!(closest_packable_fee(2047), 2047);
        assert_eq!(closest_packable_fee(2048), 2040);
    }

    #[test]
    fn test_rounds_toward_zero() {
        // 36 significant bits of mantissa: needs one division
        let value: Wei = 68_719_476_739; // 2^36 + 3
        let packed = closest_packable_amount(value);
        assert_eq!(packed, 68_719_476_730);
        assert!(packed <= value);

        let fee = parse_ether("0.123456789").unwrap();
        let packed_fee = closest_packable_fee(fee);
        assert_eq!(packed_fee, 123_400_000_000_000_000);
    }

    #[test]
    fn test_never_above_and_idempotent() {
        let samples: [Wei; 8] = [
            1,
            999_999_999_999,
            34_359_738_368,
            1_234_567_890_123_456_789,
            987_654_321_987_654_321_987,
            u64::MAX as u128,
            10u128.pow(30) + 7,
            u128::MAX,
        ];
        for value in samples {
            let amount = closest_packable_amount(value);
            assert!(amount <= value, "amount {} rounded up to {}", value, amount);
            assert_eq!(closest_packable_amount(amount), amount);

            let fee = closest_packable_fee(value);
            assert!(fee <= value, "fee {} rounded up to {}", value, fee);
            assert_eq!(closest_packable_fee(fee), fee);
        }
    }
}

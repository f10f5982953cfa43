//! Fixed-Point Numbers
//!
//! Two signed fixed-point types backed by `i128`:
//!
//! - [`Wad`]: 18 fractional digits, the settled unit for every amount and rate
//! - [`Ray`]: 27 fractional digits, used for intermediate computations
//!
//! The two precisions never mix implicitly: conversions go through
//! [`Wad::to_ray`] (exact) and [`Ray::to_wad`] (truncates toward zero).
//! Products and quotients are computed on a 256-bit intermediate and
//! truncated toward zero; every operation is checked.

use core::fmt;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uint::construct_uint;

use crate::constants::precision::{RAY, RAY_DECIMALS, WAD, WAD_DECIMALS, WAD_RAY_RATIO};
use crate::errors::{PoolError, PoolResult};

construct_uint! {
    /// 256-bit unsigned integer for widened intermediate products.
    pub struct U256(4);
}

/// Computes `a * b / c` on a 256-bit intermediate, truncating toward zero.
pub fn mul_div(a: i128, b: i128, c: i128) -> PoolResult<i128> {
    if c == 0 {
        return Err(PoolError::DivisionByZero);
    }
    let negative = (a < 0) ^ (b < 0) ^ (c < 0);

    let product = U256::from(a.unsigned_abs()) * U256::from(b.unsigned_abs());
    let quotient = product / U256::from(c.unsigned_abs());

    if quotient.bits() > 127 {
        return Err(PoolError::Overflow);
    }
    let magnitude = quotient.low_u128() as i128;
    Ok(if negative { -magnitude } else { magnitude })
}

fn pow10(exp: u32) -> i128 {
    10i128.pow(exp)
}

macro_rules! fixed_point {
    ($name:ident, $one:expr, $decimals:expr) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
            BorshSerialize, BorshDeserialize,
        )]
        pub struct $name(i128);

        impl $name {
            pub const ZERO: Self = Self(0);
            pub const ONE: Self = Self($one);
            pub const MAX: Self = Self(i128::MAX);
            /// Raw units in one whole unit
            pub const SCALE: i128 = $one;
            /// Fractional decimal digits
            pub const DECIMALS: u32 = $decimals;

            /// Wrap a raw scaled integer
            pub const fn from_raw(raw: i128) -> Self {
                Self(raw)
            }

            /// The raw scaled integer
            pub const fn raw(self) -> i128 {
                self.0
            }

            /// Whole units, checked
            pub fn from_int(units: i128) -> PoolResult<Self> {
                units.checked_mul($one).map(Self).ok_or(PoolError::Overflow)
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0
            }

            pub fn is_negative(self) -> bool {
                self.0 < 0
            }

            pub fn is_positive(self) -> bool {
                self.0 > 0
            }

            pub fn abs(self) -> PoolResult<Self> {
                self.0.checked_abs().map(Self).ok_or(PoolError::Overflow)
            }

            pub fn checked_neg(self) -> PoolResult<Self> {
                self.0.checked_neg().map(Self).ok_or(PoolError::Overflow)
            }

            pub fn checked_add(self, other: Self) -> PoolResult<Self> {
                self.0.checked_add(other.0).map(Self).ok_or(PoolError::Overflow)
            }

            pub fn checked_sub(self, other: Self) -> PoolResult<Self> {
                self.0.checked_sub(other.0).map(Self).ok_or(PoolError::Overflow)
            }

            /// Fixed-point multiply: `a * b / SCALE`
            pub fn checked_mul(self, other: Self) -> PoolResult<Self> {
                mul_div(self.0, other.0, $one).map(Self)
            }

            /// Fixed-point divide: `a * SCALE / b`
            pub fn checked_div(self, other: Self) -> PoolResult<Self> {
                if other.0 == 0 {
                    return Err(PoolError::DivisionByZero);
                }
                mul_div(self.0, $one, other.0).map(Self)
            }

            /// Multiply by a plain integer (seconds, counts)
            pub fn checked_mul_int(self, factor: i128) -> PoolResult<Self> {
                self.0.checked_mul(factor).map(Self).ok_or(PoolError::Overflow)
            }

            /// Divide by a plain integer, truncating toward zero
            pub fn checked_div_int(self, divisor: i128) -> PoolResult<Self> {
                if divisor == 0 {
                    return Err(PoolError::DivisionByZero);
                }
                self.0.checked_div(divisor).map(Self).ok_or(PoolError::Overflow)
            }

            /// `max(self, 0)`
            pub fn floor_zero(self) -> Self {
                if self.0 < 0 { Self::ZERO } else { self }
            }

            /// Tolerant equality: `|a - b| < 10^(DECIMALS - decimals)`.
            ///
            /// Strictly less-than; asking for more decimals than the type
            /// carries degrades to exact equality.
            pub fn equal(self, other: Self, decimals: u32) -> bool {
                let tolerance = pow10($decimals.saturating_sub(decimals)) as u128;
                match self.0.checked_sub(other.0) {
                    Some(diff) => diff.unsigned_abs() < tolerance,
                    None => false,
                }
            }

            /// Parse a base-10 literal such as `"-12.0375"` without going
            /// through binary floats.
            pub fn from_decimal_string(input: &str) -> PoolResult<Self> {
                parse_decimal(input, $decimals).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_decimal(f, self.0, $decimals)
            }
        }

        impl FromStr for $name {
            type Err = PoolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_decimal_string(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = <String as Deserialize>::deserialize(deserializer)?;
                Self::from_decimal_string(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_point!(Wad, WAD, WAD_DECIMALS);
fixed_point!(Ray, RAY, RAY_DECIMALS);

impl Wad {
    /// Whole units; an `i64` always fits so this cannot overflow
    pub const fn from_units(units: i64) -> Self {
        Self(units as i128 * WAD)
    }

    /// Exact widening conversion
    pub fn to_ray(self) -> PoolResult<Ray> {
        self.0.checked_mul(WAD_RAY_RATIO).map(Ray).ok_or(PoolError::Overflow)
    }

    /// Number of fractional digits actually used (trailing zeros ignored)
    pub fn used_decimals(self) -> u32 {
        let mut frac = (self.0 % WAD).unsigned_abs();
        if frac == 0 {
            return 0;
        }
        let mut decimals = WAD_DECIMALS;
        while frac % 10 == 0 {
            frac /= 10;
            decimals -= 1;
        }
        decimals
    }
}

impl Ray {
    /// Lossy narrowing conversion, truncates toward zero
    pub fn to_wad(self) -> Wad {
        Wad(self.0 / WAD_RAY_RATIO)
    }
}

fn parse_decimal(input: &str, decimals: u32) -> PoolResult<i128> {
    let invalid = |reason| PoolError::InvalidDecimal { input: input.to_string(), reason };

    let trimmed = input.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("no digits"));
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit() || c == '_');
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid("unexpected character"));
    }
    let frac_digits: String = frac_part.chars().filter(|c| *c != '_').collect();
    if !int_part.chars().chain(frac_digits.chars()).any(|c| c.is_ascii_digit()) {
        return Err(invalid("no digits"));
    }
    if frac_digits.len() as u32 > decimals {
        return Err(invalid("too many fractional digits"));
    }

    let mut value: i128 = 0;
    for c in int_part.chars().filter(|c| *c != '_') {
        let digit = c as i128 - '0' as i128;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or(PoolError::Overflow)?;
    }
    value = value.checked_mul(pow10(decimals)).ok_or(PoolError::Overflow)?;

    let mut frac: i128 = 0;
    for c in frac_digits.chars() {
        frac = frac * 10 + (c as i128 - '0' as i128);
    }
    frac *= pow10(decimals - frac_digits.len() as u32);
    value = value.checked_add(frac).ok_or(PoolError::Overflow)?;

    Ok(if negative { -value } else { value })
}

fn write_decimal(f: &mut fmt::Formatter<'_>, raw: i128, decimals: u32) -> fmt::Result {
    let one = pow10(decimals) as u128;
    let magnitude = raw.unsigned_abs();
    let sign = if raw < 0 { "-" } else { "" };
    let int_part = magnitude / one;
    let frac_part = magnitude % one;
    if frac_part == 0 {
        return write!(f, "{}{}", sign, int_part);
    }
    let frac = format!("{:0width$}", frac_part, width = decimals as usize);
    write!(f, "{}{}.{}", sign, int_part, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wad(s: &str) -> Wad {
        Wad::from_decimal_string(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(wad("1").raw(), WAD);
        assert_eq!(wad("0.05").raw(), 50_000_000_000_000_000);
        assert_eq!(wad("-2.5").raw(), -2_500_000_000_000_000_000);
        assert_eq!(wad("1_000.25").to_string(), "1000.25");
        assert_eq!(wad("-0.000000000000000001").to_string(), "-0.000000000000000001");
        assert_eq!(Ray::from_decimal_string("0.1").unwrap().raw(), RAY / 10);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Wad::from_decimal_string(""), Err(PoolError::InvalidDecimal { .. })));
        assert!(matches!(Wad::from_decimal_string("1.2.3"), Err(PoolError::InvalidDecimal { .. })));
        assert!(matches!(Wad::from_decimal_string("abc"), Err(PoolError::InvalidDecimal { .. })));
        assert!(matches!(
            Wad::from_decimal_string("0.0000000000000000001"),
            Err(PoolError::InvalidDecimal { .. })
        ));
    }

    #[test]
    fn test_parse_separators_need_digits() {
        assert_eq!(wad("1_000.5"), Wad::from_units(1000).checked_add(wad("0.5")).unwrap());
        for input in ["_", "_._", "-_", "._"] {
            assert!(
                matches!(Wad::from_decimal_string(input), Err(PoolError::InvalidDecimal { .. })),
                "{:?} parsed",
                input
            );
        }
    }

    #[test]
    fn test_mul_truncates_toward_zero() {
        // 1/3 * 3 loses the last unit
        let third = Wad::ONE.checked_div(Wad::from_units(3)).unwrap();
        assert_eq!(third.raw(), 333_333_333_333_333_333);
        let back = third.checked_mul(Wad::from_units(3)).unwrap();
        assert_eq!(back.raw(), WAD - 1);

        let neg = third.checked_neg().unwrap().checked_mul(Wad::from_units(3)).unwrap();
        assert_eq!(neg.raw(), -(WAD - 1));
    }

    #[test]
    fn test_div_by_zero() {
        assert_eq!(Wad::ONE.checked_div(Wad::ZERO), Err(PoolError::DivisionByZero));
        assert_eq!(Ray::ONE.checked_div_int(0), Err(PoolError::DivisionByZero));
    }

    #[test]
    fn test_mul_uses_wide_intermediate() {
        // 1e10 * 1e10 = 1e20: raw product is 1e56, far past i128
        let big = Wad::from_units(10_000_000_000);
        let product = big.checked_mul(big).unwrap();
        assert_eq!(product, Wad::from_int(100_000_000_000_000_000_000).unwrap());
    }

    #[test]
    fn test_mul_overflow_detected() {
        let huge = Wad::from_units(i64::MAX);
        assert_eq!(huge.checked_mul(huge), Err(PoolError::Overflow));
        assert_eq!(Wad::MAX.checked_add(Wad::ONE), Err(PoolError::Overflow));
    }

    #[test]
    fn test_equal_is_strict() {
        let a = wad("1.0001");
        let b = wad("1.0000");
        // difference is exactly 10^(18-4): not equal at 4 decimals
        assert!(!a.equal(b, 4));
        assert!(a.equal(b, 3));
        assert!(wad("1.00009").equal(b, 4));
        assert!(a.equal(a, 18));
        assert!(!a.equal(b, 30));
    }

    #[test]
    fn test_ray_to_wad_truncates() {
        let ray = Ray::from_raw(1_999_999_999);
        assert_eq!(ray.to_wad().raw(), 1);
        let neg = Ray::from_raw(-1_999_999_999);
        assert_eq!(neg.to_wad().raw(), -1);
    }

    #[test]
    fn test_used_decimals() {
        assert_eq!(wad("0.3").used_decimals(), 1);
        assert_eq!(wad("0.1234").used_decimals(), 4);
        assert_eq!(wad("0.12345").used_decimals(), 5);
        assert_eq!(wad("7").used_decimals(), 0);
    }

    #[test]
    fn test_serde_as_decimal_string() {
        let json = serde_json::to_string(&wad("0.0365")).unwrap();
        assert_eq!(json, "\"0.0365\"");
        let back: Wad = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(back, wad("12.5"));
        let ray: Ray = serde_json::from_str("\"0.000000000000000000000000001\"").unwrap();
        assert_eq!(ray.raw(), 1);
        assert!(serde_json::from_str::<Wad>("\"1.x\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_wad_to_ray_round_trip_is_lossless(raw in -(i64::MAX as i128)..(i64::MAX as i128)) {
            let value = Wad::from_raw(raw);
            prop_assert_eq!(value.to_ray().unwrap().to_wad(), value);
        }

        #[test]
        fn prop_ray_to_wad_loses_less_than_one_wad_unit(raw in -(1i128 << 100)..(1i128 << 100)) {
            let original = Ray::from_raw(raw);
            let result = original.to_wad().to_ray().unwrap();
            let diff = result.checked_sub(original).unwrap().abs().unwrap();
            prop_assert!(diff.raw() < WAD_RAY_RATIO);
        }

        #[test]
        fn prop_display_parse_round_trip(raw in any::<i64>()) {
            let value = Wad::from_raw(raw as i128);
            prop_assert_eq!(Wad::from_decimal_string(&value.to_string()).unwrap(), value);
        }
    }
}

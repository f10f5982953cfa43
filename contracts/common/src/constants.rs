//! Protocol Constants
//!
//! All magic numbers and default parameter values for the RiskPool protocol.
//! Fixed-point constants are expressed through [`Wad`] so they can be used
//! directly in checked arithmetic.

use crate::wadray::Wad;

/// Fixed-point precisions
pub mod precision {
    /// Fractional digits of a Wad
    pub const WAD_DECIMALS: u32 = 18;
    /// Fractional digits of a Ray
    pub const RAY_DECIMALS: u32 = 27;
    /// One Wad in raw units (1e18)
    pub const WAD: i128 = 1_000_000_000_000_000_000;
    /// One Ray in raw units (1e27)
    pub const RAY: i128 = 1_000_000_000_000_000_000_000_000_000;
    /// Raw units of Ray per raw unit of Wad (1e9)
    pub const WAD_RAY_RATIO: i128 = 1_000_000_000;
}

/// Time units. The protocol clock counts seconds.
pub mod time {
    /// Seconds in a day
    pub const SECONDS_PER_DAY: u64 = 24 * 3600;
    /// Seconds in a (365 day) year, used for every annualized rate
    pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;
}

/// Capital token (eToken) limits
pub mod etoken {
    use super::Wad;

    /// Smallest scale factor the token accepts (1e-10). Below this the
    /// principal/real conversion loses too much precision to be trusted.
    pub const MIN_SCALE: Wad = Wad::from_raw(100_000_000);

    /// Internal loans may never push the scale closer than this multiple of
    /// [`MIN_SCALE`].
    pub const MIN_SCALE_LOAN_MULTIPLIER: i128 = 10;

    /// Default share of the SCR that must stay liquid (100%)
    pub const DEFAULT_LIQUIDITY_REQUIREMENT: Wad = Wad::ONE;

    /// Default maximum share of the supply that can be locked as SCR (100%)
    pub const DEFAULT_MAX_UTILIZATION_RATE: Wad = Wad::ONE;

    /// Default minimum utilization rate (0%)
    pub const DEFAULT_MIN_UTILIZATION_RATE: Wad = Wad::ZERO;

    /// Default annual rate charged on internal loans (5%)
    pub const DEFAULT_INTERNAL_LOAN_INTEREST_RATE: Wad = Wad::from_raw(50_000_000_000_000_000);

    /// Liquidity requirement bounds (80% - 130%)
    pub const MIN_LIQUIDITY_REQUIREMENT: Wad = Wad::from_raw(800_000_000_000_000_000);
    pub const MAX_LIQUIDITY_REQUIREMENT: Wad = Wad::from_raw(1_300_000_000_000_000_000);

    /// Internal loan rates above 50% are rejected
    pub const MAX_INTERNAL_LOAN_INTEREST_RATE: Wad = Wad::from_raw(500_000_000_000_000_000);
}

/// Premiums account limits
pub mod premiums {
    use super::Wad;

    /// Default deficit ratio (100% of active pure premiums)
    pub const DEFAULT_DEFICIT_RATIO: Wad = Wad::ONE;

    /// Deficit ratios are stored with at most this many decimals
    pub const DEFICIT_RATIO_DECIMALS: u32 = 4;
}

/// Risk module pricing limits
pub mod risk_module {
    use super::Wad;

    /// Lowest accepted margin-on-cost (0.5)
    pub const MIN_MOC: Wad = Wad::from_raw(500_000_000_000_000_000);

    /// Highest accepted margin-on-cost (4.0)
    pub const MAX_MOC: Wad = Wad::from_raw(4_000_000_000_000_000_000);

    /// Default maximum policy duration in days
    pub const DEFAULT_MAX_DURATION_DAYS: u64 = 365;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_in_seconds() {
        assert_eq!(time::SECONDS_PER_YEAR, 31_536_000);
    }

    #[test]
    fn test_precision_ratio() {
        assert_eq!(precision::WAD * precision::WAD_RAY_RATIO, precision::RAY);
    }

    #[test]
    fn test_min_scale_is_one_e_minus_ten() {
        assert_eq!(etoken::MIN_SCALE, Wad::from_decimal_string("0.0000000001").unwrap());
    }

    #[test]
    fn test_moc_bounds_ordered() {
        assert!(risk_module::MIN_MOC < Wad::ONE);
        assert!(risk_module::MAX_MOC > Wad::ONE);
    }
}

//! Validation Helpers for the RiskPool Protocol
//!
//! Reusable input checks. Validation always runs before any state is
//! touched, so a failed check leaves every component unchanged.
//!
//! ```rust,ignore
//! use riskpool_common::check;
//!
//! check!(amount <= available, PoolError::InsufficientFunds { available, requested: amount });
//! ```

use crate::errors::{PoolError, PoolResult};
use crate::types::{is_zero_address, Address};
use crate::wadray::Wad;

// ============ Validation Macro ============

/// Check a condition and return an error if it fails.
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use check;

/// Require `0 <= value <= 1`
pub fn require_ratio(value: Wad, param: &'static str) -> PoolResult<()> {
    check!(
        !value.is_negative() && value <= Wad::ONE,
        PoolError::InvalidInput { param, reason: "must be between 0 and 1" }
    );
    Ok(())
}

/// Require `lower <= value <= upper`
pub fn require_in_range(value: Wad, lower: Wad, upper: Wad, param: &'static str) -> PoolResult<()> {
    check!(
        value >= lower && value <= upper,
        PoolError::InvalidInput { param, reason: "out of range" }
    );
    Ok(())
}

/// Require a non-negative amount
pub fn require_non_negative(value: Wad, param: &'static str) -> PoolResult<()> {
    check!(
        !value.is_negative(),
        PoolError::InvalidInput { param, reason: "must not be negative" }
    );
    Ok(())
}

/// Require a strictly positive amount
pub fn require_positive(value: Wad, param: &'static str) -> PoolResult<()> {
    check!(
        value.is_positive(),
        PoolError::InvalidInput { param, reason: "must be positive" }
    );
    Ok(())
}

/// Require that `value` uses at most `max_decimals` fractional digits
pub fn require_max_decimals(value: Wad, max_decimals: u32) -> PoolResult<()> {
    check!(
        value.used_decimals() <= max_decimals,
        PoolError::PrecisionExceeded { value, max_decimals }
    );
    Ok(())
}

/// Reject the zero address
pub fn require_address(address: &Address, param: &'static str) -> PoolResult<()> {
    check!(
        !is_zero_address(address),
        PoolError::InvalidInput { param, reason: "zero address" }
    );
    Ok(())
}

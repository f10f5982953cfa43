//! Mathematical Utilities for the RiskPool Protocol
//!
//! Interest accrual helpers shared by capital tokens, internal loans and
//! policies. All annualized rates use a 365-day year.

use crate::constants::time::SECONDS_PER_YEAR;
use crate::errors::{PoolError, PoolResult};
use crate::types::Timestamp;
use crate::wadray::{Ray, Wad};

/// Rebase a scale factor by simple interest over one period.
///
/// `new_scale = scale * (1 + elapsed * rate / YEAR)`
///
/// The increment is computed in Ray so that short periods at low rates do
/// not vanish in Wad truncation. Compounding happens only across calls.
pub fn compound_scale(scale: Wad, rate: Wad, elapsed: u64) -> PoolResult<Wad> {
    if elapsed == 0 || rate.is_zero() {
        return Ok(scale);
    }
    let increment = rate
        .to_ray()?
        .checked_mul_int(elapsed as i128)?
        .checked_div_int(SECONDS_PER_YEAR as i128)?;
    let factor = Ray::ONE.checked_add(increment)?;
    Ok(scale.to_ray()?.checked_mul(factor)?.to_wad())
}

/// Simple interest on `principal` at annual `rate` over `elapsed` seconds.
pub fn accrued_interest(principal: Wad, rate: Wad, elapsed: u64) -> PoolResult<Wad> {
    principal
        .checked_mul(rate)?
        .checked_mul_int(elapsed as i128)?
        .checked_div_int(SECONDS_PER_YEAR as i128)
}

/// Cost of capital charged for locking `scr` at annual return `roc`.
pub fn cost_of_capital(scr: Wad, roc: Wad, duration: u64) -> PoolResult<Wad> {
    accrued_interest(scr, roc, duration)
}

/// Annual rate implied by paying `coc` for `scr` over `duration` seconds.
pub fn annualized_rate(coc: Wad, scr: Wad, duration: u64) -> PoolResult<Wad> {
    if scr.is_zero() {
        return Ok(Wad::ZERO);
    }
    if duration == 0 {
        return Err(PoolError::DivisionByZero);
    }
    coc.checked_mul_int(SECONDS_PER_YEAR as i128)?
        .checked_div(scr)?
        .checked_div_int(duration as i128)
}

/// Seconds elapsed since `since`; zero if the clock did not advance.
pub fn elapsed_since(since: Timestamp, now: Timestamp) -> u64 {
    now.saturating_sub(since)
}

/// Weighted average of two rates by their amounts.
///
/// `(rate_a * amount_a + rate_b * amount_b) / (amount_a + amount_b)`
pub fn weighted_rate(rate_a: Wad, amount_a: Wad, rate_b: Wad, amount_b: Wad) -> PoolResult<Wad> {
    let total = amount_a.checked_add(amount_b)?;
    rate_a
        .checked_mul(amount_a)?
        .checked_add(rate_b.checked_mul(amount_b)?)?
        .checked_div(total)
}

/// Removes `amount_b` at `rate_b` from a weighted average over `amount_a`.
///
/// `(rate_a * amount_a - rate_b * amount_b) / (amount_a - amount_b)`
pub fn unweighted_rate(rate_a: Wad, amount_a: Wad, rate_b: Wad, amount_b: Wad) -> PoolResult<Wad> {
    let remaining = amount_a.checked_sub(amount_b)?;
    rate_a
        .checked_mul(amount_a)?
        .checked_sub(rate_b.checked_mul(amount_b)?)?
        .checked_div(remaining)
}

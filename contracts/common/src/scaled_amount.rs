//! Scaled Amounts
//!
//! A principal that accrues simple interest between rebases. Used to track
//! internal loans independently of any token balance: the stored `amount`
//! is in principal units as of `scale`, and the real value at time `t` is
//! `amount * scale * (1 + (t - last_update) * rate / YEAR)`.
//!
//! The accrual rate is passed on every call rather than stored, so callers
//! must use the same rate consistently for `add`, `sub` and reads.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::PoolResult;
use crate::math::{compound_scale, elapsed_since};
use crate::types::Timestamp;
use crate::wadray::Wad;

/// Principal/scale pair accruing at a caller-supplied rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ScaledAmount {
    /// Principal in scaled units
    pub amount: Wad,
    /// Scale as of `last_update`
    pub scale: Wad,
    /// When `scale` was last rebased; `None` until the first `add`
    pub last_update: Option<Timestamp>,
}

impl Default for ScaledAmount {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaledAmount {
    /// Empty amount with scale 1
    pub fn new() -> Self {
        Self {
            amount: Wad::ZERO,
            scale: Wad::ONE,
            last_update: None,
        }
    }

    /// Scale as of `now` at `rate`
    pub fn current_scale(&self, rate: Wad, now: Timestamp) -> PoolResult<Wad> {
        match self.last_update {
            Some(last) => compound_scale(self.scale, rate, elapsed_since(last, now)),
            None => Ok(self.scale),
        }
    }

    /// Real value of the principal as of `now`
    pub fn get_scaled_amount(&self, rate: Wad, now: Timestamp) -> PoolResult<Wad> {
        if self.amount.is_zero() {
            return Ok(Wad::ZERO);
        }
        self.amount.checked_mul(self.current_scale(rate, now)?)
    }

    /// Add `delta` real units. The first call starts the clock at scale 1.
    pub fn add(&mut self, delta: Wad, rate: Wad, now: Timestamp) -> PoolResult<()> {
        let new_scale = match self.last_update {
            None => Wad::ONE,
            Some(_) => self.current_scale(rate, now)?,
        };
        let amount = self.amount.checked_add(delta.checked_div(new_scale)?)?;

        self.scale = new_scale;
        self.last_update = Some(now);
        self.amount = amount;
        Ok(())
    }

    /// Subtract `delta` real units. A negative result is representable; the
    /// caller must check the outstanding value first.
    pub fn sub(&mut self, delta: Wad, rate: Wad, now: Timestamp) -> PoolResult<()> {
        let current = self.get_scaled_amount(rate, now)?;
        let new_scale = self.current_scale(rate, now)?;
        let amount = current.checked_sub(delta)?.checked_div(new_scale)?;

        self.scale = new_scale;
        self.last_update = Some(now);
        self.amount = amount;
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

//! Asset Managers
//!
//! Yield sources plugged under a reserve. A reserve asks its asset manager
//! for earnings since the last report and applies them to its own books;
//! the earnings themselves settle as cash between the manager's address and
//! the reserve's address on the [`CashLedger`](crate::cash::CashLedger).

use serde::{Deserialize, Serialize};

use crate::errors::PoolResult;
use crate::scaled_amount::ScaledAmount;
use crate::types::{Address, Timestamp};
use crate::validation::require_non_negative;
use crate::wadray::Wad;

/// Pluggable yield source
pub trait AssetManager {
    /// Ledger account the manager settles earnings from
    fn address(&self) -> Address;

    /// Value of the managed position as of `now`
    fn total_assets(&self, now: Timestamp) -> PoolResult<Wad>;

    /// Signed change in value since the previous report
    fn record_earnings(&mut self, now: Timestamp) -> PoolResult<Wad>;
}

/// Position earning a fixed annual rate on a notional principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRateVault {
    address: Address,
    rate: Wad,
    position: ScaledAmount,
    last_reported: Wad,
}

impl FixedRateVault {
    pub fn new(address: Address, rate: Wad) -> Self {
        Self {
            address,
            rate,
            position: ScaledAmount::new(),
            last_reported: Wad::ZERO,
        }
    }

    /// Grow the notional principal. Not reported as earnings.
    pub fn invest(&mut self, amount: Wad, now: Timestamp) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        self.position.add(amount, self.rate, now)?;
        self.last_reported = self.last_reported.checked_add(amount)?;
        Ok(())
    }

    /// Write down the position; shows up as negative earnings
    pub fn apply_loss(&mut self, amount: Wad, now: Timestamp) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        self.position.sub(amount, self.rate, now)
    }

    pub fn last_reported(&self) -> Wad {
        self.last_reported
    }
}

impl AssetManager for FixedRateVault {
    fn address(&self) -> Address {
        self.address
    }

    fn total_assets(&self, now: Timestamp) -> PoolResult<Wad> {
        self.position.get_scaled_amount(self.rate, now)
    }

    fn record_earnings(&mut self, now: Timestamp) -> PoolResult<Wad> {
        let current = self.total_assets(now)?;
        let earnings = current.checked_sub(self.last_reported)?;
        self.last_reported = current;
        log::debug!("vault earnings {} (assets {})", earnings, current);
        Ok(earnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::time::SECONDS_PER_YEAR;

    fn wad(s: &str) -> Wad {
        Wad::from_decimal_string(s).unwrap()
    }

    #[test]
    fn test_earnings_accrue_and_reset() {
        let mut vault = FixedRateVault::new([5u8; 32], wad("0.1"));
        vault.invest(Wad::from_units(1000), 0).unwrap();
        assert_eq!(vault.record_earnings(0).unwrap(), Wad::ZERO);

        let earned = vault.record_earnings(SECONDS_PER_YEAR).unwrap();
        assert_eq!(earned, Wad::from_units(100));
        // nothing new since the last report
        assert_eq!(vault.record_earnings(SECONDS_PER_YEAR).unwrap(), Wad::ZERO);
    }

    #[test]
    fn test_loss_reports_negative() {
        let mut vault = FixedRateVault::new([5u8; 32], Wad::ZERO);
        vault.invest(Wad::from_units(1000), 0).unwrap();
        vault.apply_loss(Wad::from_units(40), 10).unwrap();
        assert_eq!(vault.record_earnings(10).unwrap(), Wad::from_units(-40));
        assert_eq!(vault.last_reported(), Wad::from_units(960));
    }
}

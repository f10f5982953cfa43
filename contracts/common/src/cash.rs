//! Cash Ledger
//!
//! The settlement currency every component holds. Components move cash
//! through a [`CashLedger`] so the protocol can run against any balance
//! store; [`InMemoryLedger`] is the reference implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};
use crate::types::Address;
use crate::validation::require_non_negative;
use crate::wadray::Wad;

/// Balance store for the settlement currency
pub trait CashLedger {
    fn balance_of(&self, account: &Address) -> Wad;

    /// Move `amount` from `from` to `to`, failing if `from` is short
    fn transfer(&mut self, from: &Address, to: &Address, amount: Wad) -> PoolResult<()>;
}

/// Map-backed ledger. Zero balances are not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLedger {
    balances: BTreeMap<Address, Wad>,
    total_supply: Wad,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create cash out of thin air, for funding test accounts
    pub fn mint(&mut self, to: &Address, amount: Wad) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        let balance = self.balance_of(to).checked_add(amount)?;
        self.total_supply = self.total_supply.checked_add(amount)?;
        self.set_balance(to, balance);
        Ok(())
    }

    pub fn total_supply(&self) -> Wad {
        self.total_supply
    }

    fn set_balance(&mut self, account: &Address, balance: Wad) {
        if balance.is_zero() {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, balance);
        }
    }
}

impl CashLedger for InMemoryLedger {
    fn balance_of(&self, account: &Address) -> Wad {
        self.balances.get(account).copied().unwrap_or(Wad::ZERO)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Wad) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(PoolError::InsufficientBalance { available, requested: amount });
        }
        let to_balance = self.balance_of(to).checked_add(amount)?;
        self.set_balance(from, available.checked_sub(amount)?);
        self.set_balance(to, to_balance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];

    #[test]
    fn test_mint_and_transfer() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, Wad::from_units(100)).unwrap();
        ledger.transfer(&ALICE, &BOB, Wad::from_units(30)).unwrap();

        assert_eq!(ledger.balance_of(&ALICE), Wad::from_units(70));
        assert_eq!(ledger.balance_of(&BOB), Wad::from_units(30));
        assert_eq!(ledger.total_supply(), Wad::from_units(100));
    }

    #[test]
    fn test_transfer_insufficient() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, Wad::from_units(10)).unwrap();
        let result = ledger.transfer(&ALICE, &BOB, Wad::from_units(25));
        assert_eq!(
            result,
            Err(PoolError::InsufficientBalance { available: Wad::from_units(10), requested: Wad::from_units(25) })
        );
        assert_eq!(ledger.balance_of(&ALICE), Wad::from_units(10));
    }

    #[test]
    fn test_transfer_rejects_negative() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, Wad::from_units(10)).unwrap();
        assert!(ledger.transfer(&BOB, &ALICE, Wad::from_units(-5)).is_err());
    }

    #[test]
    fn test_zero_balances_not_stored() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, Wad::from_units(10)).unwrap();
        ledger.transfer(&ALICE, &BOB, Wad::from_units(10)).unwrap();
        assert_eq!(ledger.balances.len(), 1);
    }
}

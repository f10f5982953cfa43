//! Policy ownership registry.
//!
//! Each issued policy is a non-fungible claim owned by its holder; the
//! owner at resolution time receives the payout.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use riskpool_common::{
    check,
    errors::{PoolError, PoolResult},
    types::{Address, PolicyId},
    validation::require_address,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PolicyRegistry {
    owners: BTreeMap<PolicyId, Address>,
    /// Number of policies held per owner
    holdings: BTreeMap<Address, u64>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, policy_id: PolicyId, to: Address) -> PoolResult<()> {
        require_address(&to, "holder")?;
        check!(
            !self.owners.contains_key(&policy_id),
            PoolError::InvalidInput { param: "policy_id", reason: "already minted" }
        );
        self.owners.insert(policy_id, to);
        *self.holdings.entry(to).or_default() += 1;
        Ok(())
    }

    pub fn owner_of(&self, policy_id: PolicyId) -> PoolResult<Address> {
        self.owners
            .get(&policy_id)
            .copied()
            .ok_or(PoolError::PolicyNotFound { policy_id })
    }

    pub fn balance_of(&self, owner: &Address) -> u64 {
        self.holdings.get(owner).copied().unwrap_or(0)
    }

    /// Move `policy_id` from `from` to `to`; `from` must be the owner
    pub fn transfer_policy(&mut self, from: &Address, to: Address, policy_id: PolicyId) -> PoolResult<()> {
        require_address(&to, "to")?;
        let owner = self.owner_of(policy_id)?;
        check!(owner == *from, PoolError::Unauthorized { caller: *from });
        if owner == to {
            return Ok(());
        }

        self.owners.insert(policy_id, to);
        if let Some(count) = self.holdings.get_mut(from) {
            *count -= 1;
            if *count == 0 {
                self.holdings.remove(from);
            }
        }
        *self.holdings.entry(to).or_default() += 1;
        Ok(())
    }
}

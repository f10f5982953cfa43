//! Access Control Module
//!
//! Role-based authorization for RiskPool components. Components never hold
//! an ambient "current caller": every governed operation takes an explicit
//! `caller` and an [`AccessManager`] and checks the role up front.

use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};
use crate::types::Address;

// ============================================================================
// Types
// ============================================================================

/// Protocol roles
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum Role {
    /// Super admin, grants and revokes every other role
    Level1,
    /// Protocol admin, adjusts component parameters
    Level2,
    /// Can pause and unpause the pool
    Guardian,
    /// Can issue policies through a risk module
    PolicyCreator,
    /// Can resolve policies with a payout
    Resolver,
    /// Can trigger repayment of internal loans
    RepayLoans,
    /// Can take won premiums out of a premiums account
    WithdrawWonPremiums,
}

/// Opaque authorization check consulted before governed mutations
pub trait AccessManager {
    fn has_role(&self, role: Role, account: &Address) -> bool;
}

/// Fail with `Unauthorized` unless `caller` holds `role`
pub fn require_role(access: &dyn AccessManager, role: Role, caller: &Address) -> PoolResult<()> {
    if !access.has_role(role, caller) {
        log::debug!("caller lacks {:?}", role);
        return Err(PoolError::Unauthorized { caller: *caller });
    }
    Ok(())
}

// ============================================================================
// Role Registry
// ============================================================================

/// In-process role graph. `Level1` holders manage every assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRegistry {
    roles: BTreeMap<Role, BTreeSet<Address>>,
}

impl RoleRegistry {
    /// Create a registry with a single super admin
    pub fn new(super_admin: Address) -> Self {
        let mut registry = Self::default();
        registry.roles.entry(Role::Level1).or_default().insert(super_admin);
        registry
    }

    /// Grant `role` to `grantee`; granting twice is a no-op
    pub fn grant_role(&mut self, granter: &Address, role: Role, grantee: Address) -> PoolResult<()> {
        require_role(self, Role::Level1, granter)?;
        self.roles.entry(role).or_default().insert(grantee);
        Ok(())
    }

    /// Revoke `role` from `target`. The last super admin cannot be removed.
    pub fn revoke_role(&mut self, revoker: &Address, role: Role, target: &Address) -> PoolResult<()> {
        require_role(self, Role::Level1, revoker)?;
        if role == Role::Level1 && self.members(Role::Level1) == 1 && self.has_role(role, target) {
            return Err(PoolError::InvalidInput { param: "role", reason: "cannot revoke last super admin" });
        }
        if let Some(holders) = self.roles.get_mut(&role) {
            holders.remove(target);
        }
        Ok(())
    }

    /// Number of accounts holding `role`
    pub fn members(&self, role: Role) -> usize {
        self.roles.get(&role).map_or(0, |holders| holders.len())
    }
}

impl AccessManager for RoleRegistry {
    fn has_role(&self, role: Role, account: &Address) -> bool {
        self.roles
            .get(&role)
            .is_some_and(|holders| holders.contains(account))
    }
}

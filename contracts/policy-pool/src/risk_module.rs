//! Risk modules: the pricing and exposure envelope a partner issues
//! policies under.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use riskpool_common::{
    check,
    errors::{PoolError, PoolResult},
    policy::RiskModuleParams,
    types::Address,
    validation::require_address,
    wadray::Wad,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RiskModule {
    pub address: Address,
    pub name: String,
    /// Premiums account that receives pure premiums and pays claims
    pub premiums_account: Address,
    /// Receives the partner commission
    pub wallet: Address,
    pub params: RiskModuleParams,
    /// Sum of payouts of active policies
    pub active_exposure: Wad,
}

impl RiskModule {
    pub fn new(
        address: Address,
        name: impl Into<String>,
        premiums_account: Address,
        wallet: Address,
        params: RiskModuleParams,
    ) -> PoolResult<Self> {
        require_address(&address, "risk_module")?;
        require_address(&wallet, "wallet")?;
        params.validate()?;
        Ok(Self {
            address,
            name: name.into(),
            premiums_account,
            wallet,
            params,
            active_exposure: Wad::ZERO,
        })
    }

    pub fn check_payout(&self, payout: Wad) -> PoolResult<()> {
        let limit = self.params.max_payout_per_policy;
        check!(payout <= limit, PoolError::PayoutExceedsLimit { payout, limit });
        Ok(())
    }

    pub fn add_exposure(&mut self, payout: Wad) -> PoolResult<()> {
        let exposure = self.active_exposure.checked_add(payout)?;
        let limit = self.params.exposure_limit;
        check!(exposure <= limit, PoolError::ExposureLimitExceeded { exposure, limit });
        self.active_exposure = exposure;
        Ok(())
    }

    pub fn release_exposure(&mut self, payout: Wad) -> PoolResult<()> {
        self.active_exposure = self.active_exposure.checked_sub(payout)?.floor_zero();
        Ok(())
    }
}

//! RiskPool Capital Token (EToken)
//!
//! A fungible token whose stored balances are principal units. The real
//! balance of an account is `principal * scale_factor`, and the scale grows
//! continuously at `token_interest_rate` while capital is locked for
//! policies. One-shot gains and losses (unlock adjustments, internal loans,
//! vault earnings) are applied as a *discrete earning*: a single rebase of
//! the scale that spreads the amount over every holder at once.
//!
//! ## SCR lifecycle
//!
//! ```text
//! Unlocked --lock_scr--> Locked (scr > 0) --unlock_scr--> Unlocked
//! ```
//!
//! `scr_interest_rate` is the weighted average of the rates of every policy
//! currently locked. `token_interest_rate = scr_interest_rate * scr / supply`.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use riskpool_common::{
    check,
    access_control::{require_role, AccessManager, Role},
    asset_manager::AssetManager,
    cash::CashLedger,
    constants::etoken::{
        DEFAULT_INTERNAL_LOAN_INTEREST_RATE, DEFAULT_LIQUIDITY_REQUIREMENT,
        DEFAULT_MAX_UTILIZATION_RATE, DEFAULT_MIN_UTILIZATION_RATE, MAX_INTERNAL_LOAN_INTEREST_RATE,
        MAX_LIQUIDITY_REQUIREMENT, MIN_LIQUIDITY_REQUIREMENT, MIN_SCALE, MIN_SCALE_LOAN_MULTIPLIER,
    },
    errors::{PoolError, PoolResult},
    events::{EventLog, PoolEvent},
    math::{compound_scale, elapsed_since, unweighted_rate, weighted_rate},
    scaled_amount::ScaledAmount,
    types::{Address, Timestamp},
    validation::{require_in_range, require_non_negative, require_positive, require_ratio},
    wadray::Wad,
};

// ============ Parameters ============

/// Governance-tunable parameters of a capital token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(default)]
pub struct ETokenParams {
    /// Capital that must stay behind per unit of SCR when withdrawing
    pub liquidity_requirement: Wad,
    /// Deposits that would push utilization below this are rejected
    pub min_utilization_rate: Wad,
    /// Share of the supply that may be locked as SCR
    pub max_utilization_rate: Wad,
    /// Annual rate charged on internal loans
    pub internal_loan_interest_rate: Wad,
}

impl Default for ETokenParams {
    fn default() -> Self {
        Self {
            liquidity_requirement: DEFAULT_LIQUIDITY_REQUIREMENT,
            min_utilization_rate: DEFAULT_MIN_UTILIZATION_RATE,
            max_utilization_rate: DEFAULT_MAX_UTILIZATION_RATE,
            internal_loan_interest_rate: DEFAULT_INTERNAL_LOAN_INTEREST_RATE,
        }
    }
}

impl ETokenParams {
    pub fn validate(&self) -> PoolResult<()> {
        require_in_range(
            self.liquidity_requirement,
            MIN_LIQUIDITY_REQUIREMENT,
            MAX_LIQUIDITY_REQUIREMENT,
            "liquidity_requirement",
        )?;
        require_ratio(self.min_utilization_rate, "min_utilization_rate")?;
        require_ratio(self.max_utilization_rate, "max_utilization_rate")?;
        check!(
            self.min_utilization_rate <= self.max_utilization_rate,
            PoolError::InvalidInput { param: "min_utilization_rate", reason: "must not exceed max_utilization_rate" }
        );
        require_in_range(
            self.internal_loan_interest_rate,
            Wad::ZERO,
            MAX_INTERNAL_LOAN_INTEREST_RATE,
            "internal_loan_interest_rate",
        )
    }
}

// ============ Token State ============

/// Capital token state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EToken {
    address: Address,
    name: String,
    symbol: String,
    /// Principal per holder; zero entries are removed
    balances: BTreeMap<Address, Wad>,
    /// owner -> spender -> real amount
    allowances: BTreeMap<Address, BTreeMap<Address, Wad>>,
    /// Sum of all principal balances
    base_supply: Wad,
    scale_factor: Wad,
    last_scale_update: Timestamp,
    scr: Wad,
    scr_interest_rate: Wad,
    token_interest_rate: Wad,
    params: ETokenParams,
    /// Internal loans by borrower, accruing at `internal_loan_interest_rate`
    loans: BTreeMap<Address, ScaledAmount>,
    events: EventLog,
}

impl EToken {
    pub fn new(
        address: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        params: ETokenParams,
        now: Timestamp,
    ) -> PoolResult<Self> {
        params.validate()?;
        Ok(Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            base_supply: Wad::ZERO,
            scale_factor: Wad::ONE,
            last_scale_update: now,
            scr: Wad::ZERO,
            scr_interest_rate: Wad::ZERO,
            token_interest_rate: Wad::ZERO,
            params,
            loans: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    // ============ Accessors ============

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn params(&self) -> &ETokenParams {
        &self.params
    }

    /// Locked solvency capital, real units
    pub fn scr(&self) -> Wad {
        self.scr
    }

    pub fn scr_interest_rate(&self) -> Wad {
        self.scr_interest_rate
    }

    pub fn token_interest_rate(&self) -> Wad {
        self.token_interest_rate
    }

    /// Sum of principal balances, unaffected by the scale
    pub fn base_supply(&self) -> Wad {
        self.base_supply
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Move out events emitted since the last call
    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        self.events.drain()
    }

    // ============ Views ============

    /// Scale factor as of `now`, without rebasing
    pub fn scale_factor(&self, now: Timestamp) -> PoolResult<Wad> {
        compound_scale(
            self.scale_factor,
            self.token_interest_rate,
            elapsed_since(self.last_scale_update, now),
        )
    }

    pub fn total_supply(&self, now: Timestamp) -> PoolResult<Wad> {
        self.base_supply.checked_mul(self.scale_factor(now)?)
    }

    pub fn balance_of(&self, account: &Address, now: Timestamp) -> PoolResult<Wad> {
        match self.balances.get(account) {
            Some(principal) => principal.checked_mul(self.scale_factor(now)?),
            None => Ok(Wad::ZERO),
        }
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Wad {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(Wad::ZERO)
    }

    /// Capital not locked as SCR, floored at zero
    pub fn funds_available(&self, now: Timestamp) -> PoolResult<Wad> {
        Ok(self.total_supply(now)?.checked_sub(self.scr)?.floor_zero())
    }

    /// Capital that may still be locked under `max_utilization_rate`
    pub fn funds_available_to_lock(&self, now: Timestamp) -> PoolResult<Wad> {
        Ok(self
            .total_supply(now)?
            .checked_mul(self.params.max_utilization_rate)?
            .checked_sub(self.scr)?
            .floor_zero())
    }

    /// Capital providers may take out while honoring the liquidity requirement
    pub fn total_withdrawable(&self, now: Timestamp) -> PoolResult<Wad> {
        Ok(self
            .total_supply(now)?
            .checked_sub(self.scr.checked_mul(self.params.liquidity_requirement)?)?
            .floor_zero())
    }

    pub fn utilization_rate(&self, now: Timestamp) -> PoolResult<Wad> {
        let supply = self.total_supply(now)?;
        if supply.is_zero() {
            return Ok(Wad::ZERO);
        }
        self.scr.checked_div(supply)
    }

    /// Largest loss a discrete earning can absorb before the scale gets
    /// within `MIN_SCALE_LOAN_MULTIPLIER * MIN_SCALE` of collapsing
    pub fn max_negative_adjustment(&self, now: Timestamp) -> PoolResult<Wad> {
        let floor = MIN_SCALE
            .checked_mul_int(MIN_SCALE_LOAN_MULTIPLIER)?
            .checked_mul(self.base_supply)?;
        Ok(self.total_supply(now)?.checked_sub(floor)?.floor_zero())
    }

    /// Outstanding internal loan of `borrower`, interest included
    pub fn get_loan(&self, borrower: &Address, now: Timestamp) -> PoolResult<Wad> {
        self.loans
            .get(borrower)
            .ok_or(PoolError::UnknownBorrower { borrower: *borrower })?
            .get_scaled_amount(self.params.internal_loan_interest_rate, now)
    }

    pub fn is_borrower(&self, borrower: &Address) -> bool {
        self.loans.contains_key(borrower)
    }

    // ============ Scale Maintenance ============

    /// Bring the scale factor up to `now`
    fn update_current_scale(&mut self, now: Timestamp) -> PoolResult<()> {
        if now <= self.last_scale_update {
            return Ok(());
        }
        let new_scale = self.scale_factor(now)?;
        self.check_scale(new_scale)?;
        if new_scale != self.scale_factor {
            log::debug!("etoken scale {} -> {} at {}", self.scale_factor, new_scale, now);
        }
        self.scale_factor = new_scale;
        self.last_scale_update = now;
        Ok(())
    }

    fn check_scale(&self, scale: Wad) -> PoolResult<()> {
        if scale < MIN_SCALE {
            log::error!("etoken scale {} fell below minimum {}", scale, MIN_SCALE);
            return Err(PoolError::ScaleUnderflow { scale });
        }
        Ok(())
    }

    /// Recompute the accrual rate after any change of SCR or supply
    fn update_token_interest_rate(&mut self, now: Timestamp) -> PoolResult<()> {
        let supply = self.total_supply(now)?;
        self.token_interest_rate = if supply.is_zero() {
            Wad::ZERO
        } else {
            self.scr_interest_rate.checked_mul(self.scr)?.checked_div(supply)?
        };
        log::debug!("etoken token interest rate {}", self.token_interest_rate);
        Ok(())
    }

    /// Rebase so that `amount` is added to (or taken from) the total supply
    /// in one step, proportionally across all holders.
    fn discrete_earning(&mut self, amount: Wad, now: Timestamp) -> PoolResult<()> {
        self.update_current_scale(now)?;
        if amount.is_zero() {
            return Ok(());
        }
        let new_supply = self.total_supply(now)?.checked_add(amount)?;
        if new_supply.is_negative() {
            log::error!("discrete earning {} leaves negative supply {}", amount, new_supply);
            return Err(PoolError::NegativeSupply);
        }
        if self.base_supply.is_zero() {
            // nobody to rebase over; the cash stays with the token unallocated
            log::warn!("discrete earning {} on token with no holders, scale unchanged", amount);
            return Ok(());
        }
        let new_scale = new_supply.checked_div(self.base_supply)?;
        self.check_scale(new_scale)?;
        self.scale_factor = new_scale;

        self.events.emit(PoolEvent::DiscreteEarning {
            etoken: self.address,
            amount,
            new_scale,
            timestamp: now,
        });
        Ok(())
    }

    // ============ Principal Bookkeeping ============

    fn mint_principal(&mut self, account: &Address, principal: Wad) -> PoolResult<()> {
        let held = self.balances.get(account).copied().unwrap_or(Wad::ZERO);
        self.set_principal(account, held.checked_add(principal)?);
        self.base_supply = self.base_supply.checked_add(principal)?;
        Ok(())
    }

    fn burn_principal(&mut self, account: &Address, principal: Wad) -> PoolResult<()> {
        let held = self.balances.get(account).copied().unwrap_or(Wad::ZERO);
        let remaining = held.checked_sub(principal)?;
        let base = self.base_supply.checked_sub(principal)?;
        if remaining.is_negative() || base.is_negative() {
            log::error!("burning {} principal from {} leaves negative balance", principal, held);
            return Err(PoolError::NegativeSupply);
        }
        self.set_principal(account, remaining);
        self.base_supply = base;
        Ok(())
    }

    fn set_principal(&mut self, account: &Address, principal: Wad) {
        if principal.is_zero() {
            self.balances.remove(account);
        } else {
            self.balances.insert(*account, principal);
        }
    }

    // ============ SCR ============

    /// Lock `scr_amount` of capital for a policy paying `interest_rate`
    pub fn lock_scr(&mut self, scr_amount: Wad, interest_rate: Wad, now: Timestamp) -> PoolResult<()> {
        require_non_negative(scr_amount, "scr_amount")?;
        self.update_current_scale(now)?;

        let available = self.funds_available_to_lock(now)?;
        check!(
            scr_amount <= available,
            PoolError::InsufficientFunds { available, requested: scr_amount }
        );

        self.scr_interest_rate = if self.scr.is_zero() {
            interest_rate
        } else {
            weighted_rate(self.scr_interest_rate, self.scr, interest_rate, scr_amount)?
        };
        self.scr = self.scr.checked_add(scr_amount)?;
        self.update_token_interest_rate(now)?;

        self.events.emit(PoolEvent::ScrLocked {
            etoken: self.address,
            amount: scr_amount,
            interest_rate,
            timestamp: now,
        });
        Ok(())
    }

    /// Release `scr_amount` locked at `interest_rate` and settle the
    /// difference between promised and accrued interest as `adjustment`
    pub fn unlock_scr(
        &mut self,
        scr_amount: Wad,
        interest_rate: Wad,
        adjustment: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_non_negative(scr_amount, "scr_amount")?;
        check!(
            scr_amount <= self.scr,
            PoolError::InsufficientLockedFunds { locked: self.scr, requested: scr_amount }
        );
        self.update_current_scale(now)?;

        if scr_amount == self.scr {
            self.scr = Wad::ZERO;
            self.scr_interest_rate = Wad::ZERO;
        } else {
            let rate = unweighted_rate(self.scr_interest_rate, self.scr, interest_rate, scr_amount)?;
            if rate.is_negative() {
                log::warn!("scr interest rate drifted to {}, clamping to zero", rate);
            }
            self.scr_interest_rate = rate.floor_zero();
            self.scr = self.scr.checked_sub(scr_amount)?;
        }

        self.discrete_earning(adjustment, now)?;
        self.update_token_interest_rate(now)?;

        self.events.emit(PoolEvent::ScrUnlocked {
            etoken: self.address,
            amount: scr_amount,
            interest_rate,
            adjustment,
            timestamp: now,
        });
        Ok(())
    }

    // ============ Deposits and Withdrawals ============

    /// Take `amount` of cash from `provider` and mint the equivalent tokens.
    /// Returns the provider's new balance.
    pub fn deposit(
        &mut self,
        ledger: &mut dyn CashLedger,
        provider: &Address,
        amount: Wad,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        require_positive(amount, "amount")?;
        self.update_current_scale(now)?;

        let minimum = self.params.min_utilization_rate;
        if minimum.is_positive() {
            let utilization = self.scr.checked_div(self.total_supply(now)?.checked_add(amount)?)?;
            check!(
                utilization >= minimum,
                PoolError::UtilizationBelowMinimum { utilization, minimum }
            );
        }

        let principal = amount.checked_div(self.scale_factor)?;
        self.mint_principal(provider, principal)?;
        self.update_token_interest_rate(now)?;

        ledger.transfer(provider, &self.address, amount)?;

        self.events.emit(PoolEvent::Deposit {
            etoken: self.address,
            provider: *provider,
            amount,
            timestamp: now,
        });
        self.balance_of(provider, now)
    }

    /// Burn tokens and return cash to `provider`. `None` withdraws as much
    /// as allowed. Returns the amount withdrawn.
    pub fn withdraw(
        &mut self,
        ledger: &mut dyn CashLedger,
        provider: &Address,
        amount: Option<Wad>,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.update_current_scale(now)?;

        let balance = self.balance_of(provider, now)?;
        let maximum = balance.min(self.total_withdrawable(now)?);
        let amount = match amount {
            None => maximum,
            Some(requested) => {
                require_non_negative(requested, "amount")?;
                check!(
                    requested <= maximum,
                    PoolError::ExceedsMaxWithdrawable { maximum, requested }
                );
                requested
            }
        };
        if amount.is_zero() {
            return Ok(Wad::ZERO);
        }

        let principal = if amount == balance {
            self.balances.get(provider).copied().unwrap_or(Wad::ZERO)
        } else {
            amount.checked_div(self.scale_factor)?
        };
        self.burn_principal(provider, principal)?;
        self.update_token_interest_rate(now)?;

        ledger.transfer(&self.address, provider, amount)?;

        self.events.emit(PoolEvent::Withdraw {
            etoken: self.address,
            provider: *provider,
            amount,
            timestamp: now,
        });
        Ok(amount)
    }

    // ============ Transfers ============

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Wad, now: Timestamp) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        self.update_current_scale(now)?;

        let available = self.balance_of(from, now)?;
        check!(amount <= available, PoolError::InsufficientBalance { available, requested: amount });

        let principal = if amount == available {
            self.balances.get(from).copied().unwrap_or(Wad::ZERO)
        } else {
            amount.checked_div(self.scale_factor)?
        };
        self.burn_principal(from, principal)?;
        self.mint_principal(to, principal)?;

        self.events.emit(PoolEvent::Transfer {
            etoken: self.address,
            from: *from,
            to: *to,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Wad, now: Timestamp) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        self.set_allowance(owner, spender, amount);
        self.events.emit(PoolEvent::Approval {
            etoken: self.address,
            owner: *owner,
            spender: *spender,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    pub fn increase_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        added: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_non_negative(added, "added")?;
        let amount = self.allowance(owner, spender).checked_add(added)?;
        self.approve(owner, spender, amount, now)
    }

    pub fn decrease_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        subtracted: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_non_negative(subtracted, "subtracted")?;
        let allowed = self.allowance(owner, spender);
        check!(
            subtracted <= allowed,
            PoolError::InsufficientAllowance { allowed, requested: subtracted }
        );
        self.approve(owner, spender, allowed.checked_sub(subtracted)?, now)
    }

    /// Move `amount` from `from` to `to` on behalf of `spender`
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        let allowed = self.allowance(from, spender);
        check!(amount <= allowed, PoolError::InsufficientAllowance { allowed, requested: amount });
        self.transfer(from, to, amount, now)?;
        self.set_allowance(from, spender, allowed.checked_sub(amount)?);
        Ok(())
    }

    fn set_allowance(&mut self, owner: &Address, spender: &Address, amount: Wad) {
        let spenders = self.allowances.entry(*owner).or_default();
        if amount.is_zero() {
            spenders.remove(spender);
            if spenders.is_empty() {
                self.allowances.remove(owner);
            }
        } else {
            spenders.insert(*spender, amount);
        }
    }

    // ============ Internal Loans ============

    /// Allow `borrower` to take internal loans; no-op if already registered
    pub fn add_borrower(&mut self, borrower: Address) {
        self.loans.entry(borrower).or_default();
    }

    /// Deregister a borrower with no outstanding debt
    pub fn remove_borrower(&mut self, borrower: &Address, now: Timestamp) -> PoolResult<()> {
        let outstanding = self.get_loan(borrower, now)?;
        check!(
            outstanding.is_zero(),
            PoolError::InvalidInput { param: "borrower", reason: "loan outstanding" }
        );
        self.loans.remove(borrower);
        Ok(())
    }

    /// Lend up to `amount` to `borrower`, paying the cash to `receiver`.
    ///
    /// The loan is a loss to every holder, so it is capped by what the scale
    /// can absorb. Returns the part of `amount` that could not be lent.
    pub fn internal_loan(
        &mut self,
        ledger: &mut dyn CashLedger,
        borrower: &Address,
        amount: Wad,
        receiver: &Address,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        require_non_negative(amount, "amount")?;
        check!(
            self.loans.contains_key(borrower),
            PoolError::UnknownBorrower { borrower: *borrower }
        );
        self.update_current_scale(now)?;

        let cap = self.total_supply(now)?.min(self.max_negative_adjustment(now)?);
        let lent = amount.min(cap);
        let remainder = amount.checked_sub(lent)?;
        if remainder.is_positive() {
            log::warn!("internal loan capped at {}, {} left unfunded", lent, remainder);
        }
        if lent.is_zero() {
            return Ok(remainder);
        }

        self.discrete_earning(lent.checked_neg()?, now)?;
        let rate = self.params.internal_loan_interest_rate;
        if let Some(loan) = self.loans.get_mut(borrower) {
            loan.add(lent, rate, now)?;
        }
        self.update_token_interest_rate(now)?;

        ledger.transfer(&self.address, receiver, lent)?;

        self.events.emit(PoolEvent::InternalLoan {
            etoken: self.address,
            borrower: *borrower,
            amount: lent,
            remainder,
            timestamp: now,
        });
        Ok(remainder)
    }

    /// Repay `amount` of the loan of `on_behalf_of`, pulling cash from `payer`
    pub fn repay_loan(
        &mut self,
        ledger: &mut dyn CashLedger,
        payer: &Address,
        amount: Wad,
        on_behalf_of: &Address,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        let outstanding = self.get_loan(on_behalf_of, now)?;
        check!(
            amount <= outstanding,
            PoolError::RepayExceedsLoan { outstanding, requested: amount }
        );
        self.update_current_scale(now)?;

        let rate = self.params.internal_loan_interest_rate;
        if let Some(loan) = self.loans.get_mut(on_behalf_of) {
            loan.sub(amount, rate, now)?;
        }
        self.discrete_earning(amount, now)?;
        self.update_token_interest_rate(now)?;

        ledger.transfer(payer, &self.address, amount)?;

        self.events.emit(PoolEvent::LoanRepaid {
            etoken: self.address,
            borrower: *on_behalf_of,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    // ============ Yield and Governance ============

    /// Pull earnings from `vault` and spread them over all holders
    pub fn record_earnings(
        &mut self,
        ledger: &mut dyn CashLedger,
        vault: &mut dyn AssetManager,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        let earnings = vault.record_earnings(now)?;
        if earnings.is_positive() {
            ledger.transfer(&vault.address(), &self.address, earnings)?;
        } else if earnings.is_negative() {
            ledger.transfer(&self.address, &vault.address(), earnings.abs()?)?;
        }
        self.discrete_earning(earnings, now)?;
        self.update_token_interest_rate(now)?;

        self.events.emit(PoolEvent::EarningsRecorded {
            component: self.address,
            amount: earnings,
            timestamp: now,
        });
        Ok(earnings)
    }

    pub fn set_params(
        &mut self,
        access: &dyn AccessManager,
        caller: &Address,
        params: ETokenParams,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_role(access, Role::Level2, caller)?;
        params.validate()?;
        // accrue under the old rates before switching
        self.update_current_scale(now)?;
        self.params = params;

        self.events.emit(PoolEvent::ParamsChanged {
            component: self.address,
            changed_by: *caller,
            timestamp: now,
        });
        Ok(())
    }
}

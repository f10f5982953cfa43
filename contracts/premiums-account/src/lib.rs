//! RiskPool Premiums Account
//!
//! Holds the pure premiums of a group of risk modules. Claims are paid from
//! the premiums first; the account may run a deficit against the premiums
//! of still-active policies up to `deficit_ratio`, and anything beyond that
//! is borrowed from the junior capital token, then from the senior one.
//!
//! ```text
//! pure_premiums      = active_pure_premiums + surplus
//! max_deficit        = -(active_pure_premiums * deficit_ratio)
//! invariant          : surplus >= max_deficit
//! ```

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use riskpool_common::{
    check,
    access_control::{require_role, AccessManager, Role},
    asset_manager::AssetManager,
    cash::CashLedger,
    constants::premiums::{DEFAULT_DEFICIT_RATIO, DEFICIT_RATIO_DECIMALS},
    errors::{PoolError, PoolResult},
    events::{EventLog, PoolEvent},
    policy::Policy,
    types::{Address, Timestamp, ZERO_ADDRESS},
    validation::{require_max_decimals, require_non_negative, require_ratio},
    wadray::Wad,
};
use riskpool_etoken::EToken;

// ============ Parameters ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(default)]
pub struct PremiumsAccountParams {
    /// Share of active pure premiums that may be spent before borrowing
    pub deficit_ratio: Wad,
    /// Cap on the junior token loan; `None` is unlimited
    pub jr_loan_limit: Option<Wad>,
    /// Cap on the senior token loan; `None` is unlimited
    pub sr_loan_limit: Option<Wad>,
}

impl Default for PremiumsAccountParams {
    fn default() -> Self {
        Self {
            deficit_ratio: DEFAULT_DEFICIT_RATIO,
            jr_loan_limit: None,
            sr_loan_limit: None,
        }
    }
}

impl PremiumsAccountParams {
    pub fn validate(&self) -> PoolResult<()> {
        validate_deficit_ratio(self.deficit_ratio)?;
        validate_loan_limits(self.jr_loan_limit, self.sr_loan_limit)
    }
}

fn validate_deficit_ratio(ratio: Wad) -> PoolResult<()> {
    require_ratio(ratio, "deficit_ratio")?;
    require_max_decimals(ratio, DEFICIT_RATIO_DECIMALS)
}

fn validate_loan_limits(jr: Option<Wad>, sr: Option<Wad>) -> PoolResult<()> {
    if let Some(limit) = jr {
        require_non_negative(limit, "jr_loan_limit")?;
    }
    if let Some(limit) = sr {
        require_non_negative(limit, "sr_loan_limit")?;
    }
    Ok(())
}

// ============ Backing Tokens ============

/// Mutable handles to the capital tokens behind an account for the
/// duration of one operation
pub struct Backing<'a> {
    pub junior: Option<&'a mut EToken>,
    pub senior: Option<&'a mut EToken>,
}

impl<'a> Backing<'a> {
    pub fn new(junior: Option<&'a mut EToken>, senior: Option<&'a mut EToken>) -> Self {
        Self { junior, senior }
    }
}

fn token_address(token: &Option<&mut EToken>) -> Option<Address> {
    token.as_ref().map(|etk| etk.address())
}

// ============ Account State ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumsAccount {
    address: Address,
    junior_etk: Option<Address>,
    senior_etk: Option<Address>,
    /// Pure premiums of policies still running
    active_pure_premiums: Wad,
    /// Won premiums when positive, spent active premiums when negative
    surplus: Wad,
    params: PremiumsAccountParams,
    events: EventLog,
}

impl PremiumsAccount {
    pub fn new(
        address: Address,
        junior_etk: Option<Address>,
        senior_etk: Option<Address>,
        params: PremiumsAccountParams,
    ) -> PoolResult<Self> {
        params.validate()?;
        Ok(Self {
            address,
            junior_etk,
            senior_etk,
            active_pure_premiums: Wad::ZERO,
            surplus: Wad::ZERO,
            params,
            events: EventLog::new(),
        })
    }

    // ============ Views ============

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn junior_etk(&self) -> Option<Address> {
        self.junior_etk
    }

    pub fn senior_etk(&self) -> Option<Address> {
        self.senior_etk
    }

    pub fn params(&self) -> &PremiumsAccountParams {
        &self.params
    }

    pub fn active_pure_premiums(&self) -> Wad {
        self.active_pure_premiums
    }

    pub fn surplus(&self) -> Wad {
        self.surplus
    }

    /// Lowest surplus allowed before borrowing, always `<= 0`
    pub fn max_deficit(&self) -> PoolResult<Wad> {
        self.max_deficit_at(self.params.deficit_ratio)
    }

    fn max_deficit_at(&self, ratio: Wad) -> PoolResult<Wad> {
        self.active_pure_premiums.checked_mul(ratio)?.checked_neg()
    }

    pub fn pure_premiums(&self) -> PoolResult<Wad> {
        self.active_pure_premiums.checked_add(self.surplus)
    }

    pub fn won_pure_premiums(&self) -> Wad {
        self.surplus.floor_zero()
    }

    pub fn borrowed_active_pp(&self) -> PoolResult<Wad> {
        Ok(self.surplus.checked_neg()?.floor_zero())
    }

    /// Premiums that can go to loan repayment without breaching the deficit limit
    pub fn funds_available(&self) -> PoolResult<Wad> {
        Ok(self.surplus.checked_sub(self.max_deficit()?)?.floor_zero())
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        self.events.drain()
    }

    fn check_backing(&self, backing: &Backing<'_>) -> PoolResult<()> {
        for (given, expected) in [
            (token_address(&backing.junior), self.junior_etk),
            (token_address(&backing.senior), self.senior_etk),
        ] {
            if given != expected {
                return Err(PoolError::UnknownComponent { address: given.unwrap_or(ZERO_ADDRESS) });
            }
        }
        Ok(())
    }

    fn assert_deficit_bound(&self) -> PoolResult<()> {
        let max_deficit = self.max_deficit()?;
        if self.surplus < max_deficit {
            log::error!("surplus {} below max deficit {}", self.surplus, max_deficit);
            return Err(PoolError::DeficitInvariantBroken { surplus: self.surplus, max_deficit });
        }
        Ok(())
    }

    // ============ Policy Lifecycle ============

    /// Track the pure premium of a new policy and lock its capital
    pub fn policy_created(&mut self, backing: &mut Backing<'_>, policy: &Policy, now: Timestamp) -> PoolResult<()> {
        self.check_backing(backing)?;
        self.active_pure_premiums = self.active_pure_premiums.checked_add(policy.pure_premium)?;

        if policy.sr_scr.is_positive() {
            senior(backing)?.lock_scr(policy.sr_scr, policy.sr_interest_rate()?, now)?;
        }
        if policy.jr_scr.is_positive() {
            junior(backing)?.lock_scr(policy.jr_scr, policy.jr_interest_rate()?, now)?;
        }
        Ok(())
    }

    /// The whole pure premium is won; capital is released and the tokens
    /// settle any cost of capital they were promised but did not accrue.
    pub fn policy_expired(&mut self, backing: &mut Backing<'_>, policy: &Policy, now: Timestamp) -> PoolResult<()> {
        self.check_backing(backing)?;
        self.active_pure_premiums = self.active_pure_premiums.checked_sub(policy.pure_premium)?;
        self.store_pure_premium_won(policy.pure_premium)?;

        if policy.sr_scr.is_positive() {
            let adjustment = policy.sr_coc.checked_sub(policy.sr_accrued_interest(now)?)?;
            senior(backing)?.unlock_scr(policy.sr_scr, policy.sr_interest_rate()?, adjustment, now)?;
        }
        if policy.jr_scr.is_positive() {
            let adjustment = policy.jr_coc.checked_sub(policy.jr_accrued_interest(now)?)?;
            junior(backing)?.unlock_scr(policy.jr_scr, policy.jr_interest_rate()?, adjustment, now)?;
        }
        self.assert_deficit_bound()
    }

    /// Pay `payout` to `customer`, from premiums first and from capital
    /// token loans for the rest. Returns the amount borrowed.
    pub fn policy_resolved_with_payout(
        &mut self,
        ledger: &mut dyn CashLedger,
        backing: &mut Backing<'_>,
        customer: &Address,
        policy: &Policy,
        payout: Wad,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        require_non_negative(payout, "payout")?;
        self.check_backing(backing)?;
        self.active_pure_premiums = self.active_pure_premiums.checked_sub(policy.pure_premium)?;

        let borrow = self.pay_from_premiums(payout.checked_sub(policy.pure_premium)?)?;

        if policy.sr_scr.is_positive() {
            senior(backing)?.unlock_scr(policy.sr_scr, policy.sr_interest_rate()?, Wad::ZERO, now)?;
        }
        if policy.jr_scr.is_positive() {
            junior(backing)?.unlock_scr(policy.jr_scr, policy.jr_interest_rate()?, Wad::ZERO, now)?;
        }

        if borrow.is_positive() {
            self.borrow_from_etk(ledger, backing, borrow, customer, policy.jr_scr.is_positive(), now)?;
        }
        let from_premiums = payout.checked_sub(borrow)?;
        if from_premiums.is_positive() {
            ledger.transfer(&self.address, customer, from_premiums)?;
        }
        self.assert_deficit_bound()?;
        Ok(borrow)
    }

    // ============ Surplus Accounting ============

    fn store_pure_premium_won(&mut self, amount: Wad) -> PoolResult<()> {
        self.surplus = self.surplus.checked_add(amount)?;
        Ok(())
    }

    /// Take `to_pay` out of the surplus down to `max_deficit`. Returns the
    /// part that premiums could not cover.
    fn pay_from_premiums(&mut self, to_pay: Wad) -> PoolResult<Wad> {
        let remaining = self.surplus.checked_sub(to_pay)?;
        let max_deficit = self.max_deficit()?;
        if remaining >= max_deficit {
            self.surplus = remaining;
            return Ok(Wad::ZERO);
        }
        self.surplus = max_deficit;
        max_deficit.checked_sub(remaining)
    }

    /// Borrow `borrow` from the junior token (if `use_junior`) up to its
    /// loan limit and the rest from the senior token, paid to `receiver`.
    fn borrow_from_etk(
        &mut self,
        ledger: &mut dyn CashLedger,
        backing: &mut Backing<'_>,
        borrow: Wad,
        receiver: &Address,
        use_junior: bool,
        now: Timestamp,
    ) -> PoolResult<()> {
        let mut left = borrow;

        if use_junior {
            if let Some(etk) = backing.junior.as_deref_mut() {
                left = self.borrow_up_to_limit(ledger, etk, self.params.jr_loan_limit, left, receiver, now)?;
            }
        }
        if left.is_positive() {
            if let Some(etk) = backing.senior.as_deref_mut() {
                left = self.borrow_up_to_limit(ledger, etk, self.params.sr_loan_limit, left, receiver, now)?;
            }
        }
        if left.is_positive() {
            log::warn!("premiums account could not borrow {} of {}", left, borrow);
            return Err(PoolError::CannotBorrow { missing: left });
        }
        Ok(())
    }

    /// Returns what is still left to borrow
    fn borrow_up_to_limit(
        &self,
        ledger: &mut dyn CashLedger,
        etk: &mut EToken,
        limit: Option<Wad>,
        amount: Wad,
        receiver: &Address,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        let headroom = match limit {
            Some(limit) => limit.checked_sub(etk.get_loan(&self.address, now)?)?.floor_zero(),
            None => amount,
        };
        let request = amount.min(headroom);
        if request.is_zero() {
            return Ok(amount);
        }
        let unfunded = etk.internal_loan(ledger, &self.address, request, receiver, now)?;
        amount.checked_sub(request)?.checked_add(unfunded)
    }

    /// Repay internal loans out of available premiums, senior first.
    /// Returns the total repaid.
    pub fn repay_loans(
        &mut self,
        ledger: &mut dyn CashLedger,
        backing: &mut Backing<'_>,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.check_backing(backing)?;
        let mut repaid = Wad::ZERO;
        if let Some(etk) = backing.senior.as_deref_mut() {
            repaid = repaid.checked_add(self.repay_loan(ledger, etk, now)?)?;
        }
        if let Some(etk) = backing.junior.as_deref_mut() {
            repaid = repaid.checked_add(self.repay_loan(ledger, etk, now)?)?;
        }
        Ok(repaid)
    }

    fn repay_loan(&mut self, ledger: &mut dyn CashLedger, etk: &mut EToken, now: Timestamp) -> PoolResult<Wad> {
        let borrowed = etk.get_loan(&self.address, now)?;
        let amount = borrowed.min(self.funds_available()?);
        if !amount.is_positive() {
            return Ok(Wad::ZERO);
        }
        etk.repay_loan(ledger, &self.address, amount, &self.address, now)?;
        self.surplus = self.surplus.checked_sub(amount)?;
        self.assert_deficit_bound()?;
        Ok(amount)
    }

    // ============ Governance ============

    /// Change the deficit ratio. If the current deficit does not fit and
    /// `adjust` is set, the gap is borrowed from the capital tokens.
    #[allow(clippy::too_many_arguments)]
    pub fn set_deficit_ratio(
        &mut self,
        ledger: &mut dyn CashLedger,
        backing: &mut Backing<'_>,
        access: &dyn AccessManager,
        caller: &Address,
        new_ratio: Wad,
        adjust: bool,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_role(access, Role::Level2, caller)?;
        validate_deficit_ratio(new_ratio)?;
        self.check_backing(backing)?;

        let max_deficit = self.max_deficit_at(new_ratio)?;
        if self.surplus < max_deficit {
            check!(
                adjust,
                PoolError::DeficitExceedsNewLimit { surplus: self.surplus, max_deficit }
            );
            let borrow = max_deficit.checked_sub(self.surplus)?;
            log::warn!("deficit ratio {} requires borrowing {}", new_ratio, borrow);
            let address = self.address;
            self.borrow_from_etk(ledger, backing, borrow, &address, true, now)?;
            self.surplus = max_deficit;
        }

        let old_ratio = self.params.deficit_ratio;
        self.params.deficit_ratio = new_ratio;
        self.events.emit(PoolEvent::DeficitRatioChanged {
            premiums_account: self.address,
            old_ratio,
            new_ratio,
            timestamp: now,
        });
        self.assert_deficit_bound()
    }

    pub fn set_loan_limits(
        &mut self,
        access: &dyn AccessManager,
        caller: &Address,
        jr_loan_limit: Option<Wad>,
        sr_loan_limit: Option<Wad>,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_role(access, Role::Level2, caller)?;
        validate_loan_limits(jr_loan_limit, sr_loan_limit)?;
        self.params.jr_loan_limit = jr_loan_limit;
        self.params.sr_loan_limit = sr_loan_limit;
        self.events.emit(PoolEvent::ParamsChanged {
            component: self.address,
            changed_by: *caller,
            timestamp: now,
        });
        Ok(())
    }

    // ============ Cash In and Out ============

    /// Send won premiums to `destination`
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_won_premiums(
        &mut self,
        ledger: &mut dyn CashLedger,
        access: &dyn AccessManager,
        caller: &Address,
        amount: Wad,
        destination: &Address,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        require_role(access, Role::WithdrawWonPremiums, caller)?;
        require_non_negative(amount, "amount")?;
        let available = self.won_pure_premiums();
        check!(amount <= available, PoolError::InsufficientFunds { available, requested: amount });

        self.surplus = self.surplus.checked_sub(amount)?;
        ledger.transfer(&self.address, destination, amount)?;

        self.events.emit(PoolEvent::WonPremiumsWithdrawn {
            premiums_account: self.address,
            destination: *destination,
            amount,
            timestamp: now,
        });
        Ok(amount)
    }

    /// Accept a donation into the surplus
    pub fn receive_grant(
        &mut self,
        ledger: &mut dyn CashLedger,
        sender: &Address,
        amount: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        require_non_negative(amount, "amount")?;
        ledger.transfer(sender, &self.address, amount)?;
        self.store_pure_premium_won(amount)?;
        self.events.emit(PoolEvent::GrantReceived {
            premiums_account: self.address,
            sender: *sender,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    /// Gains become won premiums; losses are paid from premiums and the
    /// uncovered part is borrowed from the capital tokens.
    pub fn record_earnings(
        &mut self,
        ledger: &mut dyn CashLedger,
        backing: &mut Backing<'_>,
        vault: &mut dyn AssetManager,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.check_backing(backing)?;
        let earnings = vault.record_earnings(now)?;

        if earnings.is_positive() {
            ledger.transfer(&vault.address(), &self.address, earnings)?;
            self.store_pure_premium_won(earnings)?;
        } else if earnings.is_negative() {
            let loss = earnings.abs()?;
            let borrow = self.pay_from_premiums(loss)?;
            if borrow.is_positive() {
                let address = self.address;
                self.borrow_from_etk(ledger, backing, borrow, &address, true, now)?;
            }
            ledger.transfer(&self.address, &vault.address(), loss)?;
        }

        self.events.emit(PoolEvent::EarningsRecorded {
            component: self.address,
            amount: earnings,
            timestamp: now,
        });
        self.assert_deficit_bound()?;
        Ok(earnings)
    }
}

fn junior<'b>(backing: &'b mut Backing<'_>) -> PoolResult<&'b mut EToken> {
    backing
        .junior
        .as_deref_mut()
        .ok_or(PoolError::InvalidInput { param: "junior_etk", reason: "not configured" })
}

fn senior<'b>(backing: &'b mut Backing<'_>) -> PoolResult<&'b mut EToken> {
    backing
        .senior
        .as_deref_mut()
        .ok_or(PoolError::InvalidInput { param: "senior_etk", reason: "not configured" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use riskpool_common::{
        access_control::RoleRegistry,
        asset_manager::FixedRateVault,
        cash::InMemoryLedger,
        constants::time::{SECONDS_PER_DAY, SECONDS_PER_YEAR},
        policy::RiskModuleParams,
    };
    use riskpool_etoken::ETokenParams;

    const PA: Address = [0xFA; 32];
    const JR: Address = [0xE1; 32];
    const SR: Address = [0xE2; 32];
    const LP: Address = [1u8; 32];
    const CUSTOMER: Address = [2u8; 32];
    const ADMIN: Address = [9u8; 32];
    const T0: Timestamp = 1_700_000_000;

    fn wad(s: &str) -> Wad {
        Wad::from_decimal_string(s).unwrap()
    }

    struct Fixture {
        pa: PremiumsAccount,
        jr: EToken,
        sr: EToken,
        ledger: InMemoryLedger,
        access: RoleRegistry,
    }

    impl Fixture {
        fn new(params: PremiumsAccountParams) -> Self {
            let mut ledger = InMemoryLedger::new();
            ledger.mint(&LP, Wad::from_units(100_000_000)).unwrap();

            let mut jr = EToken::new(JR, "eUSD Junior", "eUSDj", ETokenParams::default(), T0).unwrap();
            let mut sr = EToken::new(SR, "eUSD Senior", "eUSDs", ETokenParams::default(), T0).unwrap();
            jr.deposit(&mut ledger, &LP, Wad::from_units(1_000), T0).unwrap();
            sr.deposit(&mut ledger, &LP, Wad::from_units(5_000), T0).unwrap();
            jr.add_borrower(PA);
            sr.add_borrower(PA);

            let mut access = RoleRegistry::new(ADMIN);
            access.grant_role(&ADMIN, Role::Level2, ADMIN).unwrap();
            access.grant_role(&ADMIN, Role::WithdrawWonPremiums, ADMIN).unwrap();

            let pa = PremiumsAccount::new(PA, Some(JR), Some(SR), params).unwrap();
            Self { pa, jr, sr, ledger, access }
        }

        /// Price a policy and hand its pure premium to the account
        fn create_policy(&mut self, id: u64, payout: i64, start: Timestamp, duration: u64) -> Policy {
            let policy = Policy::new(
                id, [7u8; 32], &rm_params(), Wad::from_units(payout), Wad::from_units(payout).checked_div_int(5).unwrap(),
                wad("0.1"), start, start + duration,
            )
            .unwrap();
            self.ledger.mint(&PA, policy.pure_premium).unwrap();
            let mut backing = Backing::new(Some(&mut self.jr), Some(&mut self.sr));
            self.pa.policy_created(&mut backing, &policy, start).unwrap();
            policy
        }

        fn resolve(&mut self, policy: &Policy, payout: Wad, now: Timestamp) -> PoolResult<Wad> {
            let mut backing = Backing::new(Some(&mut self.jr), Some(&mut self.sr));
            self.pa.policy_resolved_with_payout(&mut self.ledger, &mut backing, &CUSTOMER, policy, payout, now)
        }
    }

    /// payout 1000 at 10% loss -> pure premium 100, jr_scr 100, sr_scr 800
    fn rm_params() -> RiskModuleParams {
        RiskModuleParams {
            moc: Wad::ONE,
            jr_coll_ratio: wad("0.2"),
            coll_ratio: Wad::ONE,
            jr_roc: wad("0.1"),
            sr_roc: wad("0.05"),
            ..RiskModuleParams::default()
        }
    }

    #[test]
    fn test_pay_from_premiums_hits_deficit_limit() {
        let mut pa = PremiumsAccount::new(
            PA, None, None,
            PremiumsAccountParams { deficit_ratio: wad("0.3"), ..PremiumsAccountParams::default() },
        )
        .unwrap();
        pa.active_pure_premiums = Wad::from_units(20);

        assert_eq!(pa.max_deficit().unwrap(), Wad::from_units(-6));
        let uncovered = pa.pay_from_premiums(Wad::from_units(16)).unwrap();
        assert_eq!(uncovered, Wad::from_units(10));
        assert_eq!(pa.surplus(), Wad::from_units(-6));
        assert_eq!(pa.borrowed_active_pp().unwrap(), Wad::from_units(6));
    }

    #[test]
    fn test_pay_from_premiums_covered() {
        let mut pa = PremiumsAccount::new(PA, None, None, PremiumsAccountParams::default()).unwrap();
        pa.active_pure_premiums = Wad::from_units(20);
        pa.surplus = Wad::from_units(5);

        assert_eq!(pa.pay_from_premiums(Wad::from_units(15)).unwrap(), Wad::ZERO);
        assert_eq!(pa.surplus(), Wad::from_units(-10));
        assert_eq!(pa.pure_premiums().unwrap(), Wad::from_units(10));
        assert_eq!(pa.won_pure_premiums(), Wad::ZERO);
    }

    #[test]
    fn test_policy_created_locks_both_tranches() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);

        assert_eq!(policy.pure_premium, Wad::from_units(100));
        assert_eq!(fx.pa.active_pure_premiums(), Wad::from_units(100));
        assert_eq!(fx.jr.scr(), Wad::from_units(100));
        assert_eq!(fx.sr.scr(), Wad::from_units(800));
        assert!(fx.jr.scr_interest_rate().equal(wad("0.1"), 12));
        assert!(fx.sr.scr_interest_rate().equal(wad("0.05"), 12));
    }

    #[test]
    fn test_policy_expired_wins_premium() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);

        let end = T0 + SECONDS_PER_YEAR;
        let mut backing = Backing::new(Some(&mut fx.jr), Some(&mut fx.sr));
        fx.pa.policy_expired(&mut backing, &policy, end).unwrap();

        assert_eq!(fx.pa.active_pure_premiums(), Wad::ZERO);
        assert_eq!(fx.pa.surplus(), Wad::from_units(100));
        assert_eq!(fx.sr.scr(), Wad::ZERO);
        // senior earned its full cost of capital: 800 * 5%
        let supply = fx.sr.total_supply(end).unwrap();
        assert!(supply.equal(Wad::from_units(5040), 8), "supply {}", supply);
        let supply = fx.jr.total_supply(end).unwrap();
        assert!(supply.equal(Wad::from_units(1010), 8), "supply {}", supply);
    }

    #[test]
    fn test_small_payout_paid_from_premiums() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);

        let borrowed = fx.resolve(&policy, Wad::from_units(60), T0 + SECONDS_PER_DAY).unwrap();

        assert_eq!(borrowed, Wad::ZERO);
        assert_eq!(fx.pa.surplus(), Wad::from_units(40));
        assert_eq!(fx.ledger.balance_of(&CUSTOMER), Wad::from_units(60));
        assert_eq!(fx.jr.scr(), Wad::ZERO);
    }

    #[test]
    fn test_large_payout_borrows_from_junior() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);

        let borrowed = fx.resolve(&policy, Wad::from_units(1000), T0).unwrap();

        assert_eq!(borrowed, Wad::from_units(900));
        assert_eq!(fx.pa.surplus(), Wad::ZERO);
        assert_eq!(fx.ledger.balance_of(&CUSTOMER), Wad::from_units(1000));
        assert_eq!(fx.ledger.balance_of(&PA), Wad::ZERO);
        assert_eq!(fx.jr.get_loan(&PA, T0).unwrap(), Wad::from_units(900));
        assert_eq!(fx.jr.total_supply(T0).unwrap(), Wad::from_units(100));
        assert_eq!(fx.sr.get_loan(&PA, T0).unwrap(), Wad::ZERO);
    }

    #[test]
    fn test_junior_limit_spills_to_senior() {
        let params = PremiumsAccountParams { jr_loan_limit: Some(Wad::from_units(500)), ..PremiumsAccountParams::default() };
        let mut fx = Fixture::new(params);
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);

        fx.resolve(&policy, Wad::from_units(1000), T0).unwrap();

        assert_eq!(fx.jr.get_loan(&PA, T0).unwrap(), Wad::from_units(500));
        assert_eq!(fx.sr.get_loan(&PA, T0).unwrap(), Wad::from_units(400));
        assert_eq!(fx.sr.total_supply(T0).unwrap(), Wad::from_units(4600));
    }

    #[test]
    fn test_cannot_borrow_past_limits() {
        let params = PremiumsAccountParams {
            jr_loan_limit: Some(Wad::from_units(100)),
            sr_loan_limit: Some(Wad::from_units(100)),
            ..PremiumsAccountParams::default()
        };
        let mut fx = Fixture::new(params);
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);

        let result = fx.resolve(&policy, Wad::from_units(1000), T0);
        assert_eq!(result, Err(PoolError::CannotBorrow { missing: Wad::from_units(700) }));
    }

    #[test]
    fn test_mismatched_backing_rejected() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        let policy = Policy::new(1, [7u8; 32], &rm_params(), Wad::from_units(10), Wad::from_units(2), wad("0.1"), T0, T0 + 10).unwrap();
        let mut backing = Backing::new(Some(&mut fx.sr), None);
        let result = fx.pa.policy_created(&mut backing, &policy, T0);
        assert_eq!(result, Err(PoolError::UnknownComponent { address: SR }));
    }

    #[test]
    fn test_repay_loans_senior_first() {
        let params = PremiumsAccountParams { jr_loan_limit: Some(Wad::from_units(500)), ..PremiumsAccountParams::default() };
        let mut fx = Fixture::new(params);
        let policy = fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);
        fx.resolve(&policy, Wad::from_units(1000), T0).unwrap();

        fx.pa.receive_grant(&mut fx.ledger, &LP, Wad::from_units(450), T0).unwrap();
        assert_eq!(fx.pa.funds_available().unwrap(), Wad::from_units(450));

        let mut backing = Backing::new(Some(&mut fx.jr), Some(&mut fx.sr));
        let repaid = fx.pa.repay_loans(&mut fx.ledger, &mut backing, T0).unwrap();

        assert_eq!(repaid, Wad::from_units(450));
        assert_eq!(fx.sr.get_loan(&PA, T0).unwrap(), Wad::ZERO);
        assert_eq!(fx.jr.get_loan(&PA, T0).unwrap(), Wad::from_units(450));
        assert_eq!(fx.pa.surplus(), Wad::ZERO);
        assert_eq!(fx.sr.total_supply(T0).unwrap(), Wad::from_units(5000));
    }

    #[test]
    fn test_set_deficit_ratio() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        fx.create_policy(1, 1000, T0, SECONDS_PER_YEAR);
        fx.pa.surplus = Wad::from_units(-50);

        let mut backing = Backing::new(Some(&mut fx.jr), Some(&mut fx.sr));
        let result = fx.pa.set_deficit_ratio(&mut fx.ledger, &mut backing, &fx.access, &ADMIN, wad("0.12345"), false, T0);
        assert!(matches!(result, Err(PoolError::PrecisionExceeded { .. })));

        let result = fx.pa.set_deficit_ratio(&mut fx.ledger, &mut backing, &fx.access, &ADMIN, wad("0.3"), false, T0);
        assert_eq!(
            result,
            Err(PoolError::DeficitExceedsNewLimit { surplus: Wad::from_units(-50), max_deficit: Wad::from_units(-30) })
        );

        let result = fx.pa.set_deficit_ratio(&mut fx.ledger, &mut backing, &fx.access, &LP, wad("0.3"), true, T0);
        assert_eq!(result, Err(PoolError::Unauthorized { caller: LP }));

        fx.pa.set_deficit_ratio(&mut fx.ledger, &mut backing, &fx.access, &ADMIN, wad("0.3"), true, T0).unwrap();
        assert_eq!(fx.pa.surplus(), Wad::from_units(-30));
        assert_eq!(fx.pa.params().deficit_ratio, wad("0.3"));
        assert_eq!(fx.jr.get_loan(&PA, T0).unwrap(), Wad::from_units(20));
    }

    #[test]
    fn test_withdraw_won_premiums() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        fx.pa.receive_grant(&mut fx.ledger, &LP, Wad::from_units(80), T0).unwrap();

        let result = fx.pa.withdraw_won_premiums(&mut fx.ledger, &fx.access, &ADMIN, Wad::from_units(81), &ADMIN, T0);
        assert!(matches!(result, Err(PoolError::InsufficientFunds { .. })));

        let result = fx.pa.withdraw_won_premiums(&mut fx.ledger, &fx.access, &LP, Wad::from_units(10), &LP, T0);
        assert_eq!(result, Err(PoolError::Unauthorized { caller: LP }));

        fx.pa.withdraw_won_premiums(&mut fx.ledger, &fx.access, &ADMIN, Wad::from_units(30), &ADMIN, T0).unwrap();
        assert_eq!(fx.pa.surplus(), Wad::from_units(50));
        assert_eq!(fx.ledger.balance_of(&ADMIN), Wad::from_units(30));
    }

    #[test]
    fn test_set_loan_limits() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        fx.pa.set_loan_limits(&fx.access, &ADMIN, Some(Wad::from_units(10)), None, T0).unwrap();
        assert_eq!(fx.pa.params().jr_loan_limit, Some(Wad::from_units(10)));
        assert!(fx.pa.set_loan_limits(&fx.access, &ADMIN, Some(Wad::from_units(-1)), None, T0).is_err());
    }

    #[test]
    fn test_vault_loss_borrows_shortfall() {
        let mut fx = Fixture::new(PremiumsAccountParams::default());
        let vault_address = [0xAA; 32];
        let mut vault = FixedRateVault::new(vault_address, Wad::ZERO);
        vault.invest(Wad::from_units(500), T0).unwrap();
        vault.apply_loss(Wad::from_units(120), T0).unwrap();
        fx.pa.receive_grant(&mut fx.ledger, &LP, Wad::from_units(100), T0).unwrap();

        let mut backing = Backing::new(Some(&mut fx.jr), Some(&mut fx.sr));
        let earnings = fx.pa.record_earnings(&mut fx.ledger, &mut backing, &mut vault, T0).unwrap();

        assert_eq!(earnings, Wad::from_units(-120));
        assert_eq!(fx.pa.surplus(), Wad::ZERO);
        assert_eq!(fx.jr.get_loan(&PA, T0).unwrap(), Wad::from_units(20));
        assert_eq!(fx.ledger.balance_of(&vault_address), Wad::from_units(120));
    }

    #[test]
    fn test_params_from_json() {
        let params: PremiumsAccountParams =
            serde_json::from_str(r#"{ "deficit_ratio": "0.25", "sr_loan_limit": "10000" }"#).unwrap();
        assert_eq!(params.deficit_ratio, wad("0.25"));
        assert_eq!(params.jr_loan_limit, None);
        assert_eq!(params.sr_loan_limit, Some(Wad::from_units(10_000)));
        assert!(params.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_surplus_stays_above_max_deficit(
            ops in proptest::collection::vec((1i64..3_000, 0i64..=10_000, any::<bool>(), any::<bool>()), 1..10),
            ratio_bp in 0i64..=10_000,
        ) {
            let ratio = Wad::from_units(ratio_bp).checked_div_int(10_000).unwrap();
            let params = PremiumsAccountParams { deficit_ratio: ratio, ..PremiumsAccountParams::default() };
            let mut fx = Fixture::new(params);
            fx.jr.deposit(&mut fx.ledger, &LP, Wad::from_units(1_000_000), T0).unwrap();
            fx.sr.deposit(&mut fx.ledger, &LP, Wad::from_units(5_000_000), T0).unwrap();

            let mut now = T0;
            let mut open = Vec::new();
            for (id, (payout, resolve_bp, resolve, repay)) in ops.into_iter().enumerate() {
                let policy = fx.create_policy(id as u64, payout, now, SECONDS_PER_DAY);
                open.push((policy, resolve_bp, resolve));
                prop_assert!(fx.pa.surplus() >= fx.pa.max_deficit().unwrap());

                if open.len() > 2 {
                    let (policy, resolve_bp, resolve) = open.remove(0);
                    if resolve {
                        let amount = policy.payout.checked_mul_int(resolve_bp as i128).unwrap().checked_div_int(10_000).unwrap();
                        fx.resolve(&policy, amount, now).unwrap();
                    } else {
                        let mut backing = Backing::new(Some(&mut fx.jr), Some(&mut fx.sr));
                        fx.pa.policy_expired(&mut backing, &policy, now).unwrap();
                    }
                    prop_assert!(fx.pa.surplus() >= fx.pa.max_deficit().unwrap());
                }
                if repay {
                    let mut backing = Backing::new(Some(&mut fx.jr), Some(&mut fx.sr));
                    fx.pa.repay_loans(&mut fx.ledger, &mut backing, now).unwrap();
                    prop_assert!(fx.pa.surplus() >= fx.pa.max_deficit().unwrap());
                }
                now += SECONDS_PER_DAY;
            }
        }
    }
}

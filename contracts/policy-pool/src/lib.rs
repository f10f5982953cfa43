//! RiskPool Policy Pool
//!
//! Entry point of the protocol. The pool owns every component and the cash
//! ledger, and routes money between them:
//!
//! - **Premiums** are split at issuance: pure premium to the premiums
//!   account, cost of capital to the capital tokens, commissions to the
//!   treasury and the risk module's wallet
//! - **Payouts** come out of the premiums account, which borrows from the
//!   capital tokens when premiums run short
//!
//! Every mutating call is all-or-nothing. Components mutate in place as a
//! call runs; on error the whole pool is restored and the events emitted
//! during the call are dropped with it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use riskpool_common::{
    check,
    access_control::{require_role, Role, RoleRegistry},
    asset_manager::AssetManager,
    cash::CashLedger,
    errors::{PoolError, PoolResult},
    events::{EventLog, PoolEvent},
    policy::{Policy, RiskModuleParams},
    transaction::transact,
    types::{Address, PolicyId, Timestamp},
    validation::require_address,
    wadray::Wad,
};
use riskpool_etoken::{EToken, ETokenParams};
use riskpool_premiums_account::{Backing, PremiumsAccount};

pub mod registry;
pub mod risk_module;

pub use registry::PolicyRegistry;
pub use risk_module::RiskModule;


// ============ Requests ============

/// Parameters of a policy issued through a risk module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPolicyRequest {
    pub risk_module: Address,
    /// Pays the premium
    pub payer: Address,
    /// Owns the policy and receives any payout
    pub holder: Address,
    pub payout: Wad,
    pub premium: Wad,
    pub loss_prob: Wad,
    pub expiration: Timestamp,
}

// ============ Pool State ============

/// Everything a top-level call may touch; snapshotted per call
#[derive(Debug, Clone)]
struct PoolState<L> {
    ledger: L,
    access: RoleRegistry,
    treasury: Address,
    paused: bool,
    etokens: BTreeMap<Address, EToken>,
    premiums_accounts: BTreeMap<Address, PremiumsAccount>,
    risk_modules: BTreeMap<Address, RiskModule>,
    policies: BTreeMap<PolicyId, Policy>,
    registry: PolicyRegistry,
    next_policy_id: PolicyId,
    /// Pool-level events of the running call
    pending: EventLog,
}

pub struct PolicyPool<L: CashLedger + Clone> {
    state: PoolState<L>,
    /// Events of committed calls, in commit order
    events: EventLog,
}

impl<L: CashLedger + Clone> PolicyPool<L> {
    /// New pool with `admin` holding `Level1`
    pub fn new(admin: Address, treasury: Address, ledger: L) -> PoolResult<Self> {
        require_address(&admin, "admin")?;
        require_address(&treasury, "treasury")?;
        Ok(Self {
            state: PoolState {
                ledger,
                access: RoleRegistry::new(admin),
                treasury,
                paused: false,
                etokens: BTreeMap::new(),
                premiums_accounts: BTreeMap::new(),
                risk_modules: BTreeMap::new(),
                policies: BTreeMap::new(),
                registry: PolicyRegistry::new(),
                next_policy_id: 1,
                pending: EventLog::new(),
            },
            events: EventLog::new(),
        })
    }

    /// Run `op` atomically and publish its events on success
    fn run<T>(&mut self, op: impl FnOnce(&mut PoolState<L>) -> PoolResult<T>) -> PoolResult<T> {
        let value = transact(&mut self.state, op)?;
        for event in self.state.drain_events() {
            self.events.emit(event);
        }
        Ok(value)
    }

    // ============ Views ============

    pub fn ledger(&self) -> &L {
        &self.state.ledger
    }

    /// Direct access to the settlement currency, outside any transaction
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.state.ledger
    }

    pub fn access(&self) -> &RoleRegistry {
        &self.state.access
    }

    pub fn treasury(&self) -> Address {
        self.state.treasury
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn etoken(&self, address: &Address) -> Option<&EToken> {
        self.state.etokens.get(address)
    }

    pub fn premiums_account(&self, address: &Address) -> Option<&PremiumsAccount> {
        self.state.premiums_accounts.get(address)
    }

    pub fn risk_module(&self, address: &Address) -> Option<&RiskModule> {
        self.state.risk_modules.get(address)
    }

    /// Active policy by id; expired and resolved policies are gone
    pub fn policy(&self, policy_id: PolicyId) -> Option<&Policy> {
        self.state.policies.get(&policy_id)
    }

    pub fn owner_of(&self, policy_id: PolicyId) -> PoolResult<Address> {
        self.state.registry.owner_of(policy_id)
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.state.registry
    }

    pub fn events(&self) -> &[PoolEvent] {
        self.events.events()
    }

    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        self.events.drain()
    }

    // ============ Governance ============

    pub fn grant_role(&mut self, caller: &Address, role: Role, grantee: Address) -> PoolResult<()> {
        self.run(|state| state.access.grant_role(caller, role, grantee))
    }

    pub fn revoke_role(&mut self, caller: &Address, role: Role, target: &Address) -> PoolResult<()> {
        self.run(|state| state.access.revoke_role(caller, role, target))
    }

    pub fn pause(&mut self, caller: &Address, now: Timestamp) -> PoolResult<()> {
        self.run(|state| state.set_paused(caller, true, now))
    }

    pub fn unpause(&mut self, caller: &Address, now: Timestamp) -> PoolResult<()> {
        self.run(|state| state.set_paused(caller, false, now))
    }

    /// Register a capital token. `Level1` only.
    pub fn add_etoken(&mut self, caller: &Address, etoken: EToken) -> PoolResult<()> {
        self.run(|state| {
            require_role(&state.access, Role::Level1, caller)?;
            let address = etoken.address();
            check!(
                !state.etokens.contains_key(&address),
                PoolError::InvalidInput { param: "etoken", reason: "already registered" }
            );
            log::debug!("registering etoken {}", etoken.symbol());
            state.etokens.insert(address, etoken);
            Ok(())
        })
    }

    /// Register a premiums account and enable it as a borrower of its
    /// capital tokens, which must already be registered. `Level1` only.
    pub fn add_premiums_account(&mut self, caller: &Address, account: PremiumsAccount) -> PoolResult<()> {
        self.run(|state| {
            require_role(&state.access, Role::Level1, caller)?;
            let address = account.address();
            check!(
                !state.premiums_accounts.contains_key(&address),
                PoolError::InvalidInput { param: "premiums_account", reason: "already registered" }
            );
            check!(
                account.junior_etk().is_none() || account.junior_etk() != account.senior_etk(),
                PoolError::InvalidInput { param: "premiums_account", reason: "junior and senior must differ" }
            );
            for etk in [account.junior_etk(), account.senior_etk()].into_iter().flatten() {
                state
                    .etokens
                    .get_mut(&etk)
                    .ok_or(PoolError::UnknownComponent { address: etk })?
                    .add_borrower(address);
            }
            state.premiums_accounts.insert(address, account);
            Ok(())
        })
    }

    /// Register a risk module over a known premiums account. `Level1` only.
    pub fn add_risk_module(&mut self, caller: &Address, module: RiskModule) -> PoolResult<()> {
        self.run(|state| {
            require_role(&state.access, Role::Level1, caller)?;
            check!(
                !state.risk_modules.contains_key(&module.address),
                PoolError::InvalidInput { param: "risk_module", reason: "already registered" }
            );
            check!(
                state.premiums_accounts.contains_key(&module.premiums_account),
                PoolError::UnknownComponent { address: module.premiums_account }
            );
            state.risk_modules.insert(module.address, module);
            Ok(())
        })
    }

    pub fn set_risk_module_params(
        &mut self,
        caller: &Address,
        risk_module: &Address,
        params: RiskModuleParams,
        now: Timestamp,
    ) -> PoolResult<()> {
        self.run(|state| {
            require_role(&state.access, Role::Level2, caller)?;
            params.validate()?;
            state.risk_module_mut(risk_module)?.params = params;
            state.pending.emit(PoolEvent::ParamsChanged {
                component: *risk_module,
                changed_by: *caller,
                timestamp: now,
            });
            Ok(())
        })
    }

    pub fn set_etoken_params(
        &mut self,
        caller: &Address,
        etoken: &Address,
        params: ETokenParams,
        now: Timestamp,
    ) -> PoolResult<()> {
        self.run(|state| {
            let etk = state.etokens.get_mut(etoken).ok_or(PoolError::UnknownComponent { address: *etoken })?;
            etk.set_params(&state.access, caller, params, now)
        })
    }

    pub fn set_deficit_ratio(
        &mut self,
        caller: &Address,
        premiums_account: &Address,
        ratio: Wad,
        adjust: bool,
        now: Timestamp,
    ) -> PoolResult<()> {
        self.run(|state| {
            state.with_backing(premiums_account, |pa, backing, ledger, access| {
                pa.set_deficit_ratio(ledger, backing, access, caller, ratio, adjust, now)
            })
        })
    }

    pub fn set_loan_limits(
        &mut self,
        caller: &Address,
        premiums_account: &Address,
        jr_loan_limit: Option<Wad>,
        sr_loan_limit: Option<Wad>,
        now: Timestamp,
    ) -> PoolResult<()> {
        self.run(|state| {
            let pa = state
                .premiums_accounts
                .get_mut(premiums_account)
                .ok_or(PoolError::UnknownComponent { address: *premiums_account })?;
            pa.set_loan_limits(&state.access, caller, jr_loan_limit, sr_loan_limit, now)
        })
    }

    // ============ Liquidity Providers ============

    /// Returns the provider's new balance
    pub fn deposit(&mut self, etoken: &Address, provider: &Address, amount: Wad, now: Timestamp) -> PoolResult<Wad> {
        self.run(|state| {
            state.when_not_paused()?;
            let etk = state.etokens.get_mut(etoken).ok_or(PoolError::UnknownComponent { address: *etoken })?;
            etk.deposit(&mut state.ledger, provider, amount, now)
        })
    }

    /// `None` withdraws as much as allowed. Returns the amount withdrawn.
    pub fn withdraw(
        &mut self,
        etoken: &Address,
        provider: &Address,
        amount: Option<Wad>,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.run(|state| {
            state.when_not_paused()?;
            let etk = state.etokens.get_mut(etoken).ok_or(PoolError::UnknownComponent { address: *etoken })?;
            etk.withdraw(&mut state.ledger, provider, amount, now)
        })
    }

    pub fn transfer_etoken(
        &mut self,
        etoken: &Address,
        from: &Address,
        to: &Address,
        amount: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        self.run(|state| {
            state.when_not_paused()?;
            let etk = state.etokens.get_mut(etoken).ok_or(PoolError::UnknownComponent { address: *etoken })?;
            etk.transfer(from, to, amount, now)
        })
    }

    // ============ Policy Lifecycle ============

    /// Price, fund and issue a policy. Returns its id.
    pub fn new_policy(&mut self, caller: &Address, request: NewPolicyRequest, now: Timestamp) -> PoolResult<PolicyId> {
        self.run(|state| state.new_policy(caller, &request, now))
    }

    /// Close a policy that ran to expiration without a claim. Open to anyone.
    pub fn expire_policy(&mut self, policy_id: PolicyId, now: Timestamp) -> PoolResult<()> {
        self.run(|state| {
            state.when_not_paused()?;
            let policy = state.active_policy(policy_id)?;
            check!(policy.is_expired(now), PoolError::PolicyNotExpired { policy_id });
            state.close_without_payout(policy, now)
        })
    }

    /// Pay `payout` to the current holder of an active policy. Returns the
    /// amount the premiums account had to borrow.
    pub fn resolve_policy(
        &mut self,
        caller: &Address,
        policy_id: PolicyId,
        payout: Wad,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.run(|state| state.resolve_policy(caller, policy_id, payout, now))
    }

    pub fn transfer_policy(&mut self, from: &Address, to: Address, policy_id: PolicyId, now: Timestamp) -> PoolResult<()> {
        self.run(|state| {
            state.when_not_paused()?;
            state.registry.transfer_policy(from, to, policy_id)?;
            state.pending.emit(PoolEvent::PolicyTransferred { policy_id, from: *from, to, timestamp: now });
            Ok(())
        })
    }

    // ============ Premiums and Yield ============

    /// Repay the premiums account's internal loans from available premiums
    pub fn repay_loans(&mut self, caller: &Address, premiums_account: &Address, now: Timestamp) -> PoolResult<Wad> {
        self.run(|state| {
            require_role(&state.access, Role::RepayLoans, caller)?;
            state.when_not_paused()?;
            state.with_backing(premiums_account, |pa, backing, ledger, _| pa.repay_loans(ledger, backing, now))
        })
    }

    pub fn withdraw_won_premiums(
        &mut self,
        caller: &Address,
        premiums_account: &Address,
        amount: Wad,
        destination: &Address,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.run(|state| {
            state.when_not_paused()?;
            let pa = state
                .premiums_accounts
                .get_mut(premiums_account)
                .ok_or(PoolError::UnknownComponent { address: *premiums_account })?;
            pa.withdraw_won_premiums(&mut state.ledger, &state.access, caller, amount, destination, now)
        })
    }

    pub fn receive_grant(
        &mut self,
        premiums_account: &Address,
        sender: &Address,
        amount: Wad,
        now: Timestamp,
    ) -> PoolResult<()> {
        self.run(|state| {
            let pa = state
                .premiums_accounts
                .get_mut(premiums_account)
                .ok_or(PoolError::UnknownComponent { address: *premiums_account })?;
            pa.receive_grant(&mut state.ledger, sender, amount, now)
        })
    }

    /// Apply yield from `vault` to a capital token. The vault is outside
    /// the pool and keeps its own state if the call fails.
    pub fn record_etoken_earnings(
        &mut self,
        etoken: &Address,
        vault: &mut dyn AssetManager,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.run(|state| {
            let etk = state.etokens.get_mut(etoken).ok_or(PoolError::UnknownComponent { address: *etoken })?;
            etk.record_earnings(&mut state.ledger, vault, now)
        })
    }

    /// Apply yield from `vault` to a premiums account
    pub fn record_premiums_earnings(
        &mut self,
        premiums_account: &Address,
        vault: &mut dyn AssetManager,
        now: Timestamp,
    ) -> PoolResult<Wad> {
        self.run(|state| {
            state.with_backing(premiums_account, |pa, backing, ledger, _| pa.record_earnings(ledger, backing, vault, now))
        })
    }
}

// ============ Internals ============

impl<L: CashLedger + Clone> PoolState<L> {
    fn when_not_paused(&self) -> PoolResult<()> {
        check!(!self.paused, PoolError::ProtocolPaused);
        Ok(())
    }

    fn set_paused(&mut self, caller: &Address, paused: bool, now: Timestamp) -> PoolResult<()> {
        require_role(&self.access, Role::Guardian, caller)?;
        if self.paused == paused {
            return Ok(());
        }
        self.paused = paused;
        let event = if paused {
            log::warn!("pool paused at {}", now);
            PoolEvent::Paused { by: *caller, timestamp: now }
        } else {
            PoolEvent::Unpaused { by: *caller, timestamp: now }
        };
        self.pending.emit(event);
        Ok(())
    }

    fn risk_module_mut(&mut self, address: &Address) -> PoolResult<&mut RiskModule> {
        self.risk_modules
            .get_mut(address)
            .ok_or(PoolError::UnknownComponent { address: *address })
    }

    fn active_policy(&self, policy_id: PolicyId) -> PoolResult<Policy> {
        self.policies
            .get(&policy_id)
            .cloned()
            .ok_or(PoolError::PolicyNotFound { policy_id })
    }

    /// Run `op` on a premiums account with its capital tokens checked out
    fn with_backing<T, F>(&mut self, premiums_account: &Address, op: F) -> PoolResult<T>
    where
        F: FnOnce(&mut PremiumsAccount, &mut Backing<'_>, &mut L, &RoleRegistry) -> PoolResult<T>,
    {
        let pa = self
            .premiums_accounts
            .get_mut(premiums_account)
            .ok_or(PoolError::UnknownComponent { address: *premiums_account })?;
        let mut junior = take_etoken(&mut self.etokens, pa.junior_etk())?;
        let mut senior = take_etoken(&mut self.etokens, pa.senior_etk())?;

        let result = {
            let mut backing = Backing::new(junior.as_mut(), senior.as_mut());
            op(pa, &mut backing, &mut self.ledger, &self.access)
        };

        for etk in [junior, senior].into_iter().flatten() {
            self.etokens.insert(etk.address(), etk);
        }
        result
    }

    fn new_policy(&mut self, caller: &Address, request: &NewPolicyRequest, now: Timestamp) -> PoolResult<PolicyId> {
        require_role(&self.access, Role::PolicyCreator, caller)?;
        self.when_not_paused()?;

        let policy_id = self.next_policy_id;
        let rm = self.risk_module_mut(&request.risk_module)?;
        rm.check_payout(request.payout)?;
        let policy = Policy::new(
            policy_id,
            rm.address,
            &rm.params,
            request.payout,
            request.premium,
            request.loss_prob,
            now,
            request.expiration,
        )?;
        rm.add_exposure(request.payout)?;
        let premiums_account = rm.premiums_account;
        let wallet = rm.wallet;

        self.collect_premium(&request.payer, &policy, &premiums_account, &wallet)?;
        self.with_backing(&premiums_account, |pa, backing, _, _| pa.policy_created(backing, &policy, now))?;
        self.registry.mint(policy_id, request.holder)?;

        log::debug!("policy {} issued, payout {} premium {}", policy_id, policy.payout, policy.premium);
        self.pending.emit(PoolEvent::PolicyCreated {
            policy_id,
            risk_module: request.risk_module,
            holder: request.holder,
            payout: policy.payout,
            premium: policy.premium,
            policy_hash: policy.hash(),
            timestamp: now,
        });
        self.policies.insert(policy_id, policy);
        self.next_policy_id += 1;
        Ok(policy_id)
    }

    /// Route each premium component from `payer` to its destination
    fn collect_premium(
        &mut self,
        payer: &Address,
        policy: &Policy,
        premiums_account: &Address,
        wallet: &Address,
    ) -> PoolResult<()> {
        let pa = self
            .premiums_accounts
            .get(premiums_account)
            .ok_or(PoolError::UnknownComponent { address: *premiums_account })?;
        let routes = [
            (Some(*premiums_account), policy.pure_premium),
            (pa.junior_etk(), policy.jr_coc),
            (pa.senior_etk(), policy.sr_coc),
            (Some(self.treasury), policy.ensuro_commission),
            (Some(*wallet), policy.partner_commission),
        ];
        for (destination, amount) in routes {
            if !amount.is_positive() {
                continue;
            }
            let destination = destination.ok_or(PoolError::InvalidInput {
                param: "premiums_account",
                reason: "no capital token for tranche",
            })?;
            self.ledger.transfer(payer, &destination, amount)?;
        }
        Ok(())
    }

    fn resolve_policy(&mut self, caller: &Address, policy_id: PolicyId, payout: Wad, now: Timestamp) -> PoolResult<Wad> {
        require_role(&self.access, Role::Resolver, caller)?;
        self.when_not_paused()?;

        let policy = self.active_policy(policy_id)?;
        check!(!policy.is_expired(now), PoolError::PolicyExpired { policy_id });
        check!(
            !payout.is_negative() && payout <= policy.payout,
            PoolError::PayoutExceedsLimit { payout, limit: policy.payout }
        );
        if payout.is_zero() {
            self.close_without_payout(policy, now)?;
            return Ok(Wad::ZERO);
        }

        let holder = self.registry.owner_of(policy_id)?;
        let premiums_account = self.risk_module_mut(&policy.risk_module)?.premiums_account;
        let borrowed = self.with_backing(&premiums_account, |pa, backing, ledger, _| {
            pa.policy_resolved_with_payout(ledger, backing, &holder, &policy, payout, now)
        })?;
        self.risk_module_mut(&policy.risk_module)?.release_exposure(policy.payout)?;
        self.policies.remove(&policy_id);

        if borrowed.is_positive() {
            log::warn!("policy {} payout needed {} of internal loans", policy_id, borrowed);
        }
        self.pending.emit(PoolEvent::PolicyResolved { policy_id, payout, borrowed, timestamp: now });
        Ok(borrowed)
    }

    fn close_without_payout(&mut self, policy: Policy, now: Timestamp) -> PoolResult<()> {
        let premiums_account = self.risk_module_mut(&policy.risk_module)?.premiums_account;
        self.with_backing(&premiums_account, |pa, backing, _, _| pa.policy_expired(backing, &policy, now))?;
        self.risk_module_mut(&policy.risk_module)?.release_exposure(policy.payout)?;
        self.policies.remove(&policy.id);
        self.pending.emit(PoolEvent::PolicyExpired { policy_id: policy.id, timestamp: now });
        Ok(())
    }

    /// Component events first, then pool events, all from the last call
    fn drain_events(&mut self) -> Vec<PoolEvent> {
        let mut events = Vec::new();
        for etk in self.etokens.values_mut() {
            events.extend(etk.take_events());
        }
        for pa in self.premiums_accounts.values_mut() {
            events.extend(pa.take_events());
        }
        events.extend(self.pending.drain());
        events
    }
}

fn take_etoken(etokens: &mut BTreeMap<Address, EToken>, address: Option<Address>) -> PoolResult<Option<EToken>> {
    match address {
        None => Ok(None),
        Some(address) => etokens
            .remove(&address)
            .map(Some)
            .ok_or(PoolError::UnknownComponent { address }),
    }
}

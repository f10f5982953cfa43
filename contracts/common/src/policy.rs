//! Policy Pricing
//!
//! Splits a policy premium into pure premium, cost of capital for the
//! junior and senior capital tokens, protocol commission and partner
//! commission. The split is computed once when the policy is created and
//! the resulting [`Policy`] snapshot never changes afterwards.
//!
//! ```text
//! pure_premium       = payout * loss_prob * moc
//! jr_scr             = max(payout * jr_coll_ratio - pure_premium, 0)
//! sr_scr             = max(payout * coll_ratio - pure_premium - jr_scr, 0)
//! jr_coc             = jr_scr * jr_roc * duration / YEAR
//! sr_coc             = sr_scr * sr_roc * duration / YEAR
//! ensuro_commission  = pure_premium * ensuro_pp_fee + (jr_coc + sr_coc) * ensuro_coc_fee
//! partner_commission = premium - (pure_premium + jr_coc + sr_coc + ensuro_commission)
//! ```

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::check;
use crate::constants::risk_module::{DEFAULT_MAX_DURATION_DAYS, MAX_MOC, MIN_MOC};
use crate::constants::time::SECONDS_PER_DAY;
use crate::errors::{PoolError, PoolResult};
use crate::math::{accrued_interest, annualized_rate, cost_of_capital};
use crate::types::{Address, PolicyId, Timestamp};
use crate::validation::{require_in_range, require_non_negative, require_ratio};
use crate::wadray::Wad;

// ============================================================================
// Risk Module Parameters
// ============================================================================

/// Pricing and exposure parameters of a risk module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(default)]
pub struct RiskModuleParams {
    /// Margin on cost applied to the expected loss
    pub moc: Wad,
    /// Share of the payout covered by pure premium plus junior capital
    pub jr_coll_ratio: Wad,
    /// Share of the payout covered by pure premium plus all capital
    pub coll_ratio: Wad,
    /// Protocol fee on pure premium
    pub ensuro_pp_fee: Wad,
    /// Protocol fee on cost of capital
    pub ensuro_coc_fee: Wad,
    /// Annual return on junior capital
    pub jr_roc: Wad,
    /// Annual return on senior capital
    pub sr_roc: Wad,
    /// Largest payout a single policy may carry
    pub max_payout_per_policy: Wad,
    /// Largest sum of active payouts
    pub exposure_limit: Wad,
    /// Longest policy duration
    pub max_duration_days: u64,
}

impl Default for RiskModuleParams {
    fn default() -> Self {
        Self {
            moc: Wad::ONE,
            jr_coll_ratio: Wad::ZERO,
            coll_ratio: Wad::ONE,
            ensuro_pp_fee: Wad::ZERO,
            ensuro_coc_fee: Wad::ZERO,
            jr_roc: Wad::ZERO,
            sr_roc: Wad::ZERO,
            max_payout_per_policy: Wad::MAX,
            exposure_limit: Wad::MAX,
            max_duration_days: DEFAULT_MAX_DURATION_DAYS,
        }
    }
}

impl RiskModuleParams {
    pub fn validate(&self) -> PoolResult<()> {
        require_in_range(self.moc, MIN_MOC, MAX_MOC, "moc")?;
        require_ratio(self.jr_coll_ratio, "jr_coll_ratio")?;
        require_ratio(self.coll_ratio, "coll_ratio")?;
        check!(
            self.jr_coll_ratio <= self.coll_ratio,
            PoolError::InvalidInput { param: "jr_coll_ratio", reason: "must not exceed coll_ratio" }
        );
        require_ratio(self.ensuro_pp_fee, "ensuro_pp_fee")?;
        require_ratio(self.ensuro_coc_fee, "ensuro_coc_fee")?;
        require_ratio(self.jr_roc, "jr_roc")?;
        require_ratio(self.sr_roc, "sr_roc")?;
        require_non_negative(self.max_payout_per_policy, "max_payout_per_policy")?;
        require_non_negative(self.exposure_limit, "exposure_limit")?;
        check!(
            self.max_duration_days > 0,
            PoolError::InvalidInput { param: "max_duration_days", reason: "must be positive" }
        );
        Ok(())
    }
}

// ============================================================================
// Premium Split
// ============================================================================

/// Components of a premium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PremiumSplit {
    pub pure_premium: Wad,
    pub jr_scr: Wad,
    pub sr_scr: Wad,
    pub jr_coc: Wad,
    pub sr_coc: Wad,
    pub ensuro_commission: Wad,
    pub partner_commission: Wad,
}

impl PremiumSplit {
    /// Smallest premium that covers everything but the partner commission
    pub fn minimum_premium(&self) -> PoolResult<Wad> {
        self.pure_premium
            .checked_add(self.jr_coc)?
            .checked_add(self.sr_coc)?
            .checked_add(self.ensuro_commission)
    }
}

/// Split `premium` for a policy of `payout` at `loss_prob` lasting
/// `duration` seconds. Fails if the premium cannot cover the minimum.
pub fn compute_premium_split(
    params: &RiskModuleParams,
    payout: Wad,
    premium: Wad,
    loss_prob: Wad,
    duration: u64,
) -> PoolResult<PremiumSplit> {
    let pure_premium = payout.checked_mul(loss_prob)?.checked_mul(params.moc)?;

    let jr_scr = payout
        .checked_mul(params.jr_coll_ratio)?
        .checked_sub(pure_premium)?
        .floor_zero();
    let sr_scr = payout
        .checked_mul(params.coll_ratio)?
        .checked_sub(pure_premium)?
        .checked_sub(jr_scr)?
        .floor_zero();

    let jr_coc = cost_of_capital(jr_scr, params.jr_roc, duration)?;
    let sr_coc = cost_of_capital(sr_scr, params.sr_roc, duration)?;

    let ensuro_commission = pure_premium
        .checked_mul(params.ensuro_pp_fee)?
        .checked_add(jr_coc.checked_add(sr_coc)?.checked_mul(params.ensuro_coc_fee)?)?;

    let mut split = PremiumSplit {
        pure_premium,
        jr_scr,
        sr_scr,
        jr_coc,
        sr_coc,
        ensuro_commission,
        partner_commission: Wad::ZERO,
    };

    let minimum = split.minimum_premium()?;
    check!(premium >= minimum, PoolError::PremiumBelowMinimum { premium, minimum });
    split.partner_commission = premium.checked_sub(minimum)?;

    Ok(split)
}

// ============================================================================
// Policy Snapshot
// ============================================================================

/// Accounting snapshot of an issued policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Policy {
    pub id: PolicyId,
    /// Risk module that priced the policy
    pub risk_module: Address,
    pub payout: Wad,
    pub premium: Wad,
    pub loss_prob: Wad,
    pub start: Timestamp,
    pub expiration: Timestamp,
    pub pure_premium: Wad,
    pub jr_scr: Wad,
    pub sr_scr: Wad,
    pub jr_coc: Wad,
    pub sr_coc: Wad,
    pub ensuro_commission: Wad,
    pub partner_commission: Wad,
}

impl Policy {
    /// Validate inputs and price a new policy
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PolicyId,
        risk_module: Address,
        params: &RiskModuleParams,
        payout: Wad,
        premium: Wad,
        loss_prob: Wad,
        start: Timestamp,
        expiration: Timestamp,
    ) -> PoolResult<Self> {
        require_non_negative(payout, "payout")?;
        require_non_negative(premium, "premium")?;
        require_ratio(loss_prob, "loss_prob")?;
        check!(
            premium <= payout,
            PoolError::InvalidInput { param: "premium", reason: "cannot exceed payout" }
        );
        check!(
            expiration > start,
            PoolError::InvalidInput { param: "expiration", reason: "must be after start" }
        );
        let duration = expiration - start;
        check!(
            duration <= params.max_duration_days.saturating_mul(SECONDS_PER_DAY),
            PoolError::InvalidInput { param: "expiration", reason: "policy too long" }
        );

        let split = compute_premium_split(params, payout, premium, loss_prob, duration)?;

        Ok(Self {
            id,
            risk_module,
            payout,
            premium,
            loss_prob,
            start,
            expiration,
            pure_premium: split.pure_premium,
            jr_scr: split.jr_scr,
            sr_scr: split.sr_scr,
            jr_coc: split.jr_coc,
            sr_coc: split.sr_coc,
            ensuro_commission: split.ensuro_commission,
            partner_commission: split.partner_commission,
        })
    }

    pub fn duration(&self) -> u64 {
        self.expiration.saturating_sub(self.start)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expiration
    }

    /// Annual rate the junior tranche earns on its locked SCR
    pub fn jr_interest_rate(&self) -> PoolResult<Wad> {
        annualized_rate(self.jr_coc, self.jr_scr, self.duration())
    }

    /// Annual rate the senior tranche earns on its locked SCR
    pub fn sr_interest_rate(&self) -> PoolResult<Wad> {
        annualized_rate(self.sr_coc, self.sr_scr, self.duration())
    }

    /// Junior cost of capital the token has accrued on this policy by `now`
    pub fn jr_accrued_interest(&self, now: Timestamp) -> PoolResult<Wad> {
        accrued_interest(self.jr_scr, self.jr_interest_rate()?, self.elapsed(now))
    }

    /// Senior cost of capital the token has accrued on this policy by `now`.
    /// Keeps running past expiration until the policy is closed.
    pub fn sr_accrued_interest(&self, now: Timestamp) -> PoolResult<Wad> {
        accrued_interest(self.sr_scr, self.sr_interest_rate()?, self.elapsed(now))
    }

    fn elapsed(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.start)
    }

    /// SHA-256 over the Borsh encoding, identifies the exact snapshot
    pub fn hash(&self) -> [u8; 32] {
        let encoded = borsh::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::time::SECONDS_PER_YEAR;
    use proptest::prelude::*;

    fn wad(s: &str) -> Wad {
        Wad::from_decimal_string(s).unwrap()
    }

    fn params() -> RiskModuleParams {
        RiskModuleParams {
            moc: wad("1.1"),
            jr_coll_ratio: wad("0.1"),
            coll_ratio: wad("0.6"),
            ensuro_pp_fee: wad("0.05"),
            ensuro_coc_fee: wad("0.1"),
            jr_roc: wad("0.2"),
            sr_roc: wad("0.1"),
            ..RiskModuleParams::default()
        }
    }

    #[test]
    fn test_split_full_year() {
        // payout 1000, loss 2%, moc 1.1 -> pure premium 22
        let split = compute_premium_split(
            &params(), Wad::from_units(1000), Wad::from_units(200), wad("0.02"), SECONDS_PER_YEAR,
        )
        .unwrap();

        assert_eq!(split.pure_premium, Wad::from_units(22));
        assert_eq!(split.jr_scr, Wad::from_units(78)); // 100 - 22
        assert_eq!(split.sr_scr, Wad::from_units(500)); // 600 - 22 - 78
        assert_eq!(split.jr_coc, wad("15.6"));
        assert_eq!(split.sr_coc, Wad::from_units(50));
        // 22 * 0.05 + 65.6 * 0.1
        assert_eq!(split.ensuro_commission, wad("7.66"));
        assert_eq!(split.partner_commission, wad("104.74"));
    }

    #[test]
    fn test_split_scr_floors_at_zero() {
        // pure premium above both collateral levels
        let split = compute_premium_split(
            &params(), Wad::from_units(1000), Wad::from_units(900), wad("0.6"), SECONDS_PER_YEAR,
        )
        .unwrap();
        assert_eq!(split.pure_premium, Wad::from_units(660));
        assert_eq!(split.jr_scr, Wad::ZERO);
        assert_eq!(split.sr_scr, Wad::ZERO);
        assert_eq!(split.jr_coc, Wad::ZERO);
    }

    #[test]
    fn test_split_premium_below_minimum() {
        let result = compute_premium_split(
            &params(), Wad::from_units(1000), Wad::from_units(50), wad("0.02"), SECONDS_PER_YEAR,
        );
        assert_eq!(
            result,
            Err(PoolError::PremiumBelowMinimum { premium: Wad::from_units(50), minimum: wad("95.26") })
        );
    }

    #[test]
    fn test_params_validation() {
        assert!(params().validate().is_ok());
        let bad_moc = RiskModuleParams { moc: wad("5"), ..params() };
        assert!(bad_moc.validate().is_err());
        let inverted = RiskModuleParams { jr_coll_ratio: wad("0.7"), ..params() };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_params_from_json() {
        let json = r#"{ "moc": "1.2", "coll_ratio": "0.5", "sr_roc": "0.08" }"#;
        let parsed: RiskModuleParams = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.moc, wad("1.2"));
        assert_eq!(parsed.coll_ratio, wad("0.5"));
        assert_eq!(parsed.jr_coll_ratio, Wad::ZERO);
        assert_eq!(parsed.exposure_limit, Wad::MAX);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_policy_rates_and_accrual() {
        let start = 1_000;
        let expiration = start + SECONDS_PER_YEAR / 2;
        let policy = Policy::new(
            1, [7u8; 32], &params(), Wad::from_units(1000), Wad::from_units(200), wad("0.02"),
            start, expiration,
        )
        .unwrap();

        assert!(policy.jr_interest_rate().unwrap().equal(wad("0.2"), 15));
        assert!(policy.sr_interest_rate().unwrap().equal(wad("0.1"), 15));

        let half = policy.sr_accrued_interest(start + SECONDS_PER_YEAR / 4).unwrap();
        assert!(half.equal(wad("12.5"), 10), "accrued {}", half);

        let at_end = policy.sr_accrued_interest(expiration).unwrap();
        assert!(at_end.equal(policy.sr_coc, 10));

        // keeps accruing while the policy stays open past expiration
        let late = policy.sr_accrued_interest(expiration + SECONDS_PER_YEAR / 2).unwrap();
        assert!(late.equal(policy.sr_coc.checked_mul_int(2).unwrap(), 10), "late {}", late);
    }

    #[test]
    fn test_policy_validation() {
        let p = params();
        let err = Policy::new(1, [7u8; 32], &p, Wad::from_units(100), Wad::from_units(200), wad("0.02"), 0, 10);
        assert!(matches!(err, Err(PoolError::InvalidInput { param: "premium", .. })));

        let err = Policy::new(1, [7u8; 32], &p, Wad::from_units(100), Wad::from_units(20), wad("1.5"), 0, 10);
        assert!(matches!(err, Err(PoolError::InvalidInput { param: "loss_prob", .. })));

        let err = Policy::new(1, [7u8; 32], &p, Wad::from_units(100), Wad::from_units(20), wad("0.1"), 10, 10);
        assert!(matches!(err, Err(PoolError::InvalidInput { param: "expiration", .. })));
    }

    #[test]
    fn test_policy_hash_changes_with_content() {
        let p = params();
        let a = Policy::new(1, [7u8; 32], &p, Wad::from_units(1000), Wad::from_units(200), wad("0.02"), 0, 1000).unwrap();
        let mut b = a.clone();
        assert_eq!(a.hash(), b.hash());
        b.id = 2;
        assert_ne!(a.hash(), b.hash());
    }

    proptest! {
        #[test]
        fn prop_split_is_complete(
            payout_units in 1i64..1_000_000,
            loss_bp in 0i64..10_000,
            duration in 1u64..SECONDS_PER_YEAR,
            premium_extra_bp in 0i64..5_000,
        ) {
            let payout = Wad::from_units(payout_units);
            let loss_prob = Wad::from_units(loss_bp).checked_div_int(10_000).unwrap();
            // price once at the minimum, then add part of the remaining headroom
            let floor = compute_premium_split(&params(), payout, Wad::MAX, loss_prob, duration).unwrap();
            let minimum = floor.minimum_premium().unwrap();
            let headroom = payout.checked_sub(minimum).unwrap().floor_zero();
            let extra = headroom.checked_mul_int(premium_extra_bp as i128).unwrap().checked_div_int(10_000).unwrap();
            let premium = minimum.checked_add(extra).unwrap();

            let split = compute_premium_split(&params(), payout, premium, loss_prob, duration).unwrap();
            let total = split.minimum_premium().unwrap().checked_add(split.partner_commission).unwrap();
            prop_assert_eq!(total, premium);
            prop_assert!(!split.partner_commission.is_negative());
        }
    }
}

//! Error Types for the RiskPool Protocol
//!
//! Typed errors with a stable code per variant. Errors fall in three groups:
//! validation errors (bad input, nothing mutated), insufficient-resource
//! errors (legitimate business rejections), and fatal invariant violations
//! that must abort the whole top-level operation. Partial fills are not
//! errors; they are reported through return values.

use thiserror::Error;

use crate::types::{Address, PolicyId};
use crate::wadray::Wad;

/// Result type alias for RiskPool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Main error enum for all RiskPool protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Malformed decimal literal
    #[error("invalid decimal '{input}': {reason}")]
    InvalidDecimal { input: String, reason: &'static str },

    /// Value carries more fractional digits than allowed
    #[error("value {value} has more than {max_decimals} decimals")]
    PrecisionExceeded { value: Wad, max_decimals: u32 },

    // ============ Input Validation Errors ============
    /// Invalid input parameter
    #[error("invalid {param}: {reason}")]
    InvalidInput { param: &'static str, reason: &'static str },

    // ============ Capital Errors ============
    /// Not enough unlocked capital to lock as SCR (or to honor a request)
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Wad, requested: Wad },

    /// Unlock request exceeds locked SCR
    #[error("insufficient locked funds: locked {locked}, requested {requested}")]
    InsufficientLockedFunds { locked: Wad, requested: Wad },

    /// Account balance too low
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Wad, requested: Wad },

    /// Spender allowance too low
    #[error("insufficient allowance: allowed {allowed}, requested {requested}")]
    InsufficientAllowance { allowed: Wad, requested: Wad },

    /// Withdrawal exceeds what liquidity requirements allow
    #[error("withdrawal of {requested} exceeds max withdrawable {maximum}")]
    ExceedsMaxWithdrawable { maximum: Wad, requested: Wad },

    /// Deposit would dilute utilization below the configured floor
    #[error("utilization {utilization} below minimum {minimum}")]
    UtilizationBelowMinimum { utilization: Wad, minimum: Wad },

    // ============ Fatal Invariant Violations ============
    /// Scale factor fell below the minimum
    #[error("scale factor {scale} below minimum")]
    ScaleUnderflow { scale: Wad },

    /// A supply or balance became negative
    #[error("negative supply")]
    NegativeSupply,

    /// Premiums account surplus fell below the allowed deficit
    #[error("surplus {surplus} below max deficit {max_deficit}")]
    DeficitInvariantBroken { surplus: Wad, max_deficit: Wad },

    // ============ Loan Errors ============
    /// Loan operation on a borrower the token does not know
    #[error("unknown borrower")]
    UnknownBorrower { borrower: Address },

    /// Neither capital token could fund the required loan
    #[error("cannot borrow: {missing} left unfunded")]
    CannotBorrow { missing: Wad },

    /// Repayment larger than outstanding debt
    #[error("repayment {requested} exceeds outstanding loan {outstanding}")]
    RepayExceedsLoan { outstanding: Wad, requested: Wad },

    // ============ Premiums Account Errors ============
    /// Current deficit does not fit a tighter deficit ratio
    #[error("deficit exceeds new limit: surplus {surplus}, new max deficit {max_deficit}")]
    DeficitExceedsNewLimit { surplus: Wad, max_deficit: Wad },

    // ============ Policy Errors ============
    /// Premium does not cover pure premium, cost of capital and commissions
    #[error("premium {premium} below minimum {minimum}")]
    PremiumBelowMinimum { premium: Wad, minimum: Wad },

    /// Policy id unknown or no longer active
    #[error("policy {policy_id} not found")]
    PolicyNotFound { policy_id: PolicyId },

    /// Policy cannot be expired yet
    #[error("policy {policy_id} not expired")]
    PolicyNotExpired { policy_id: PolicyId },

    /// Policy can no longer be resolved with a payout
    #[error("policy {policy_id} already expired")]
    PolicyExpired { policy_id: PolicyId },

    /// Payout above the policy or risk module limit
    #[error("payout {payout} exceeds limit {limit}")]
    PayoutExceedsLimit { payout: Wad, limit: Wad },

    /// Risk module exposure would exceed its limit
    #[error("exposure {exposure} exceeds limit {limit}")]
    ExposureLimitExceeded { exposure: Wad, limit: Wad },

    // ============ Authorization / State Errors ============
    /// Caller lacks the required role
    #[error("unauthorized")]
    Unauthorized { caller: Address },

    /// Protocol is paused
    #[error("protocol paused")]
    ProtocolPaused,

    /// Component address not registered in the pool
    #[error("unknown component")]
    UnknownComponent { address: Address },
}

impl PoolError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::Overflow => "E001_OVERFLOW",
            Self::DivisionByZero => "E002_DIV_ZERO",
            Self::InvalidDecimal { .. } => "E003_INVALID_DECIMAL",
            Self::PrecisionExceeded { .. } => "E004_PRECISION",
            Self::InvalidInput { .. } => "E010_INVALID_INPUT",
            Self::InsufficientFunds { .. } => "E020_INSUFFICIENT_FUNDS",
            Self::InsufficientLockedFunds { .. } => "E021_INSUFFICIENT_LOCKED",
            Self::InsufficientBalance { .. } => "E022_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E023_INSUFFICIENT_ALLOWANCE",
            Self::ExceedsMaxWithdrawable { .. } => "E024_EXCEEDS_WITHDRAWABLE",
            Self::UtilizationBelowMinimum { .. } => "E025_UTILIZATION_BELOW_MIN",
            Self::ScaleUnderflow { .. } => "E030_SCALE_UNDERFLOW",
            Self::NegativeSupply => "E031_NEGATIVE_SUPPLY",
            Self::DeficitInvariantBroken { .. } => "E032_DEFICIT_INVARIANT",
            Self::UnknownBorrower { .. } => "E040_UNKNOWN_BORROWER",
            Self::CannotBorrow { .. } => "E041_CANNOT_BORROW",
            Self::RepayExceedsLoan { .. } => "E042_REPAY_EXCEEDS_LOAN",
            Self::DeficitExceedsNewLimit { .. } => "E050_DEFICIT_EXCEEDS_LIMIT",
            Self::PremiumBelowMinimum { .. } => "E060_PREMIUM_BELOW_MIN",
            Self::PolicyNotFound { .. } => "E061_POLICY_NOT_FOUND",
            Self::PolicyNotExpired { .. } => "E062_POLICY_NOT_EXPIRED",
            Self::PolicyExpired { .. } => "E063_POLICY_EXPIRED",
            Self::PayoutExceedsLimit { .. } => "E064_PAYOUT_LIMIT",
            Self::ExposureLimitExceeded { .. } => "E065_EXPOSURE_LIMIT",
            Self::Unauthorized { .. } => "E070_UNAUTHORIZED",
            Self::ProtocolPaused => "E071_PAUSED",
            Self::UnknownComponent { .. } => "E072_UNKNOWN_COMPONENT",
        }
    }

    /// Returns true if this error is recoverable (caller can fix input or retry)
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns true if the numeric model left its safe operating range.
    /// These errors must abort the whole top-level operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ScaleUnderflow { .. } | Self::NegativeSupply | Self::DeficitInvariantBroken { .. }
        )
    }
}

//! RiskPool Common Library
//!
//! Shared types, constants and numeric foundations for the RiskPool
//! insurance capital protocol. The protocol keeps three kinds of books:
//!
//! - **Capital tokens** (`riskpool-etoken`): interest-bearing pools that lock
//!   solvency capital for policies and lend to premiums accounts
//! - **Premiums accounts** (`riskpool-premiums-account`): hold pure premiums,
//!   pay claims and borrow from capital tokens when premiums run short
//! - **Policy pool** (`riskpool-policy-pool`): routes premiums and payouts
//!   between the two and commits every operation atomically
//!
//! Everything here is deterministic: amounts are [`Wad`]/[`Ray`] fixed point
//! and time is an explicit [`Timestamp`] argument.

pub mod constants;
pub mod errors;
pub mod types;
pub mod wadray;
pub mod math;
pub mod validation;
pub mod scaled_amount;
pub mod policy;
pub mod events;
pub mod access_control;
pub mod cash;
pub mod asset_manager;
pub mod transaction;

// Re-exports for convenience
pub use errors::*;
pub use types::*;
pub use wadray::{Ray, Wad, U256};
pub use scaled_amount::ScaledAmount;
pub use policy::{compute_premium_split, Policy, PremiumSplit, RiskModuleParams};
pub use events::*;
pub use access_control::*;
pub use cash::{CashLedger, InMemoryLedger};
pub use asset_manager::{AssetManager, FixedRateVault};
pub use transaction::transact;

//! Core Types for the RiskPool Protocol
//!
//! Identifiers shared by every component.

/// Type alias for addresses (32-byte account or component identifier)
pub type Address = [u8; 32];

/// Type alias for policy identifiers
pub type PolicyId = u64;

/// Seconds on the protocol's logical clock. Time is always an explicit
/// input; nothing in the protocol reads the OS clock.
pub type Timestamp = u64;

/// The zero address, never a valid account
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Returns an error-friendly check for the zero address
pub fn is_zero_address(address: &Address) -> bool {
    *address == ZERO_ADDRESS
}

//! Protocol Events for RiskPool
//!
//! Events are collected in an [`EventLog`] owned by each component while an
//! operation runs, and drained by the pool once the operation commits.
//! A rolled-back operation discards its events along with its state.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, PolicyId, Timestamp};
use crate::wadray::Wad;

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Capital Token Events (0x01 - 0x1F)
    Deposit = 0x01,
    Withdraw = 0x02,
    Transfer = 0x03,
    Approval = 0x04,
    ScrLocked = 0x05,
    ScrUnlocked = 0x06,
    DiscreteEarning = 0x07,
    InternalLoan = 0x08,
    LoanRepaid = 0x09,
    EarningsRecorded = 0x0A,
    ParamsChanged = 0x0B,

    // Policy Events (0x20 - 0x3F)
    PolicyCreated = 0x20,
    PolicyExpired = 0x21,
    PolicyResolved = 0x22,
    PolicyTransferred = 0x23,

    // Premiums Events (0x40 - 0x5F)
    WonPremiumsWithdrawn = 0x40,
    GrantReceived = 0x41,
    DeficitRatioChanged = 0x42,

    // Protocol Events (0x80 - 0x9F)
    Paused = 0x80,
    Unpaused = 0x81,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolEvent {
    // ============ Capital Token Events ============

    /// Cash deposited and tokens minted
    Deposit {
        etoken: Address,
        provider: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    /// Tokens burned and cash returned
    Withdraw {
        etoken: Address,
        provider: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    Transfer {
        etoken: Address,
        from: Address,
        to: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    Approval {
        etoken: Address,
        owner: Address,
        spender: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    /// Capital locked as solvency requirement for a policy
    ScrLocked {
        etoken: Address,
        amount: Wad,
        interest_rate: Wad,
        timestamp: Timestamp,
    },

    ScrUnlocked {
        etoken: Address,
        amount: Wad,
        interest_rate: Wad,
        adjustment: Wad,
        timestamp: Timestamp,
    },

    /// Lump-sum gain or loss spread over all holders
    DiscreteEarning {
        etoken: Address,
        amount: Wad,
        new_scale: Wad,
        timestamp: Timestamp,
    },

    InternalLoan {
        etoken: Address,
        borrower: Address,
        amount: Wad,
        remainder: Wad,
        timestamp: Timestamp,
    },

    LoanRepaid {
        etoken: Address,
        borrower: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    /// Yield reported by an asset manager
    EarningsRecorded {
        component: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    ParamsChanged {
        component: Address,
        changed_by: Address,
        timestamp: Timestamp,
    },

    // ============ Policy Events ============

    PolicyCreated {
        policy_id: PolicyId,
        risk_module: Address,
        holder: Address,
        payout: Wad,
        premium: Wad,
        policy_hash: [u8; 32],
        timestamp: Timestamp,
    },

    PolicyExpired {
        policy_id: PolicyId,
        timestamp: Timestamp,
    },

    PolicyResolved {
        policy_id: PolicyId,
        payout: Wad,
        borrowed: Wad,
        timestamp: Timestamp,
    },

    PolicyTransferred {
        policy_id: PolicyId,
        from: Address,
        to: Address,
        timestamp: Timestamp,
    },

    // ============ Premiums Events ============

    WonPremiumsWithdrawn {
        premiums_account: Address,
        destination: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    GrantReceived {
        premiums_account: Address,
        sender: Address,
        amount: Wad,
        timestamp: Timestamp,
    },

    DeficitRatioChanged {
        premiums_account: Address,
        old_ratio: Wad,
        new_ratio: Wad,
        timestamp: Timestamp,
    },

    // ============ Protocol Events ============

    Paused {
        by: Address,
        timestamp: Timestamp,
    },

    Unpaused {
        by: Address,
        timestamp: Timestamp,
    },
}

impl PoolEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdraw { .. } => EventType::Withdraw,
            Self::Transfer { .. } => EventType::Transfer,
            Self::Approval { .. } => EventType::Approval,
            Self::ScrLocked { .. } => EventType::ScrLocked,
            Self::ScrUnlocked { .. } => EventType::ScrUnlocked,
            Self::DiscreteEarning { .. } => EventType::DiscreteEarning,
            Self::InternalLoan { .. } => EventType::InternalLoan,
            Self::LoanRepaid { .. } => EventType::LoanRepaid,
            Self::EarningsRecorded { .. } => EventType::EarningsRecorded,
            Self::ParamsChanged { .. } => EventType::ParamsChanged,
            Self::PolicyCreated { .. } => EventType::PolicyCreated,
            Self::PolicyExpired { .. } => EventType::PolicyExpired,
            Self::PolicyResolved { .. } => EventType::PolicyResolved,
            Self::PolicyTransferred { .. } => EventType::PolicyTransferred,
            Self::WonPremiumsWithdrawn { .. } => EventType::WonPremiumsWithdrawn,
            Self::GrantReceived { .. } => EventType::GrantReceived,
            Self::DeficitRatioChanged { .. } => EventType::DeficitRatioChanged,
            Self::Paused { .. } => EventType::Paused,
            Self::Unpaused { .. } => EventType::Unpaused,
        }
    }

    /// Logical time the event was emitted at
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Deposit { timestamp, .. }
            | Self::Withdraw { timestamp, .. }
            | Self::Transfer { timestamp, .. }
            | Self::Approval { timestamp, .. }
            | Self::ScrLocked { timestamp, .. }
            | Self::ScrUnlocked { timestamp, .. }
            | Self::DiscreteEarning { timestamp, .. }
            | Self::InternalLoan { timestamp, .. }
            | Self::LoanRepaid { timestamp, .. }
            | Self::EarningsRecorded { timestamp, .. }
            | Self::ParamsChanged { timestamp, .. }
            | Self::PolicyCreated { timestamp, .. }
            | Self::PolicyExpired { timestamp, .. }
            | Self::PolicyResolved { timestamp, .. }
            | Self::PolicyTransferred { timestamp, .. }
            | Self::WonPremiumsWithdrawn { timestamp, .. }
            | Self::GrantReceived { timestamp, .. }
            | Self::DeficitRatioChanged { timestamp, .. }
            | Self::Paused { timestamp, .. }
            | Self::Unpaused { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<PoolEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: PoolEvent) {
        log::trace!("event {:?}", event.event_type());
        self.events.push(event);
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// Move all events out, leaving the log empty
    pub fn drain(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&PoolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

//! Ledger effect interface
//!
//! The vault contract is an opaque service: it accepts calls and emits an
//! append-only event log. Two event families exist, generic operations
//! (scheduled bypass calls) and configuration changes, each with a
//! Scheduled → {Applied | Cancelled} lifecycle keyed by [`OpHash`].
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: production chain client (external), `warden-testkit::MemoryLedger`
//! - **Usage**: vault deployment, operation tracking, guardian cancellation

use crate::identifiers::{Address, OpHash, ParticipantHash, Selector, TxHash, VaultId};
use crate::participant::Participant;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Ledger block height
pub type BlockNumber = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Ledger-side failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LedgerError {
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("operation {op_hash} matured at {due_time}")]
    Matured { op_hash: OpHash, due_time: Timestamp },
    #[error("operation {op_hash} already applied or cancelled")]
    AlreadyFinalized { op_hash: OpHash },
    #[error("stale state nonce: expected {expected}, actual {actual}")]
    StaleState { expected: u64, actual: u64 },
    #[error("call rejected: {reason}")]
    Rejected { reason: String },
}

/// Event family: generic delayed calls or configuration changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventFamily {
    Operation,
    Config,
}

/// Lifecycle phase of a delayed operation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPhase {
    Scheduled,
    Applied,
    Cancelled,
}

/// Query over one family/phase within an inclusive block range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub family: EventFamily,
    pub phase: EventPhase,
    pub from_block: BlockNumber,
    pub to_block: BlockNumber,
}

/// Scheduled generic call (`scheduleBypassCall`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub op_hash: OpHash,
    pub sender: ParticipantHash,
    pub target: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub due_time: Timestamp,
}

/// Configuration change kinds carried in `ConfigPending` actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    AddParticipant,
    RemoveParticipant,
    AddBypassByTarget,
    AddBypassByMethod,
    RemoveBypassByTarget,
    RemoveBypassByMethod,
    AddOperator,
    AddOperatorNow,
    SetAcceleratedCalls,
    SetAddOperatorNow,
    Unfreeze,
    /// Code not known to this build
    Unknown(u8),
}

impl ChangeType {
    /// Wire code emitted by the contract
    pub fn code(self) -> u8 {
        match self {
            ChangeType::AddParticipant => 0,
            ChangeType::RemoveParticipant => 1,
            ChangeType::AddBypassByTarget => 2,
            ChangeType::AddBypassByMethod => 3,
            ChangeType::RemoveBypassByTarget => 4,
            ChangeType::RemoveBypassByMethod => 5,
            ChangeType::AddOperator => 6,
            ChangeType::AddOperatorNow => 7,
            ChangeType::SetAcceleratedCalls => 8,
            ChangeType::SetAddOperatorNow => 9,
            ChangeType::Unfreeze => 10,
            ChangeType::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChangeType::AddParticipant,
            1 => ChangeType::RemoveParticipant,
            2 => ChangeType::AddBypassByTarget,
            3 => ChangeType::AddBypassByMethod,
            4 => ChangeType::RemoveBypassByTarget,
            5 => ChangeType::RemoveBypassByMethod,
            6 => ChangeType::AddOperator,
            7 => ChangeType::AddOperatorNow,
            8 => ChangeType::SetAcceleratedCalls,
            9 => ChangeType::SetAddOperatorNow,
            10 => ChangeType::Unfreeze,
            other => ChangeType::Unknown(other),
        }
    }

    /// Whether the first argument word is a participant hash
    pub fn targets_participant(self) -> bool {
        matches!(
            self,
            ChangeType::AddParticipant
                | ChangeType::RemoveParticipant
                | ChangeType::AddOperator
                | ChangeType::AddOperatorNow
        )
    }
}

/// Raw configuration action as emitted; `code` is decoded by consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfigAction {
    pub code: u8,
    pub arg1: [u8; 32],
    pub arg2: [u8; 32],
}

/// Scheduled configuration change (`ConfigPending`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledConfigChange {
    pub op_hash: OpHash,
    pub sender: ParticipantHash,
    pub actions: Vec<RawConfigAction>,
    pub due_time: Timestamp,
}

/// Contract events relevant to Warden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    VaultInitialized {
        participants: Vec<ParticipantHash>,
        delays: Vec<u64>,
        required_approvals: Vec<u32>,
    },
    OperationScheduled(ScheduledCall),
    OperationApplied { op_hash: OpHash },
    OperationCancelled { op_hash: OpHash, by: ParticipantHash },
    ConfigScheduled(ScheduledConfigChange),
    ConfigApplied { op_hash: OpHash },
    ConfigCancelled { op_hash: OpHash, by: ParticipantHash },
}

impl LedgerEvent {
    /// Operation hash for lifecycle events
    pub fn op_hash(&self) -> Option<OpHash> {
        match self {
            LedgerEvent::VaultInitialized { .. } => None,
            LedgerEvent::OperationScheduled(call) => Some(call.op_hash),
            LedgerEvent::ConfigScheduled(change) => Some(change.op_hash),
            LedgerEvent::OperationApplied { op_hash }
            | LedgerEvent::OperationCancelled { op_hash, .. }
            | LedgerEvent::ConfigApplied { op_hash }
            | LedgerEvent::ConfigCancelled { op_hash, .. } => Some(*op_hash),
        }
    }

    /// Family for lifecycle events
    pub fn family(&self) -> Option<EventFamily> {
        match self {
            LedgerEvent::VaultInitialized { .. } => None,
            LedgerEvent::OperationScheduled(_)
            | LedgerEvent::OperationApplied { .. }
            | LedgerEvent::OperationCancelled { .. } => Some(EventFamily::Operation),
            LedgerEvent::ConfigScheduled(_)
            | LedgerEvent::ConfigApplied { .. }
            | LedgerEvent::ConfigCancelled { .. } => Some(EventFamily::Config),
        }
    }

    /// Phase for lifecycle events
    pub fn phase(&self) -> Option<EventPhase> {
        match self {
            LedgerEvent::VaultInitialized { .. } => None,
            LedgerEvent::OperationScheduled(_) | LedgerEvent::ConfigScheduled(_) => {
                Some(EventPhase::Scheduled)
            }
            LedgerEvent::OperationApplied { .. } | LedgerEvent::ConfigApplied { .. } => {
                Some(EventPhase::Applied)
            }
            LedgerEvent::OperationCancelled { .. } | LedgerEvent::ConfigCancelled { .. } => {
                Some(EventPhase::Cancelled)
            }
        }
    }
}

/// Event with its ledger position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub vault: Address,
    pub block: BlockNumber,
    pub tx_hash: TxHash,
    pub event: LedgerEvent,
}

/// Live notification pushed to subscribers
pub type LedgerNotification = EventRecord;

/// Parameters of the contract's one-shot `initialConfig` call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InitialConfig {
    pub participants: Vec<ParticipantHash>,
    pub delays: Vec<u64>,
    pub allow_accelerated_calls: bool,
    pub allow_add_operator_now: bool,
    pub required_approvals_per_level: Vec<u32>,
    pub bypass_targets: Vec<Address>,
    pub bypass_methods: Vec<Selector>,
    /// One module per target, then one per method
    pub bypass_modules: Vec<Address>,
}

/// Delayed call submitted through `scheduleBypassCall`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassCall {
    pub target: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

/// Result of a state-changing ledger call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block: BlockNumber,
    pub events: Vec<EventRecord>,
}

/// Freshly created, not yet configured vault contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDeployment {
    pub address: Address,
    pub block: BlockNumber,
}

/// Ledger effect operations
#[async_trait]
pub trait LedgerEffects: Send + Sync {
    /// Current chain head
    async fn latest_block(&self) -> Result<BlockNumber, LedgerError>;

    /// Block the vault contract was created in
    async fn deployed_block(&self, vault: &Address) -> Result<BlockNumber, LedgerError>;

    /// Optimistic staleness nonce for state-changing calls
    async fn state_nonce(&self, vault: &Address) -> Result<u64, LedgerError>;

    /// Targets of the vault's active bypass policy modules
    async fn bypass_policies(&self, vault: &Address) -> Result<Vec<Address>, LedgerError>;

    /// Past events for one family/phase in a block range
    async fn past_events(
        &self,
        vault: &Address,
        filter: EventFilter,
    ) -> Result<Vec<EventRecord>, LedgerError>;

    /// Create an unconfigured vault contract
    async fn create_vault(
        &self,
        vault_id: VaultId,
        deployer: &Address,
    ) -> Result<VaultDeployment, LedgerError>;

    /// Submit the one-shot initial configuration
    async fn initial_config(
        &self,
        vault: &Address,
        sender: &Address,
        config: &InitialConfig,
    ) -> Result<TxReceipt, LedgerError>;

    /// Schedule a delayed generic call
    async fn schedule_bypass_call(
        &self,
        vault: &Address,
        sender: &Participant,
        call: &BypassCall,
        state_nonce: u64,
    ) -> Result<TxReceipt, LedgerError>;

    /// Schedule the add-operator-now configuration change
    async fn add_operator_now(
        &self,
        vault: &Address,
        sender: &Participant,
        new_operator: &Participant,
        state_nonce: u64,
    ) -> Result<TxReceipt, LedgerError>;

    /// Cancel a pending operation before its due time
    async fn cancel_operation(
        &self,
        vault: &Address,
        sender: &Participant,
        family: EventFamily,
        op_hash: &OpHash,
    ) -> Result<TxReceipt, LedgerError>;

    /// Live stream of newly emitted events
    fn subscribe(&self) -> broadcast::Receiver<LedgerNotification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_codes_are_stable() {
        for code in 0..=10u8 {
            let change = ChangeType::from_code(code);
            assert!(!matches!(change, ChangeType::Unknown(_)));
            assert_eq!(change.code(), code);
        }
        assert_eq!(ChangeType::from_code(42), ChangeType::Unknown(42));
        assert_eq!(ChangeType::AddOperatorNow.code(), 7);
    }

    #[test]
    fn test_event_lifecycle_accessors() {
        let op_hash = OpHash::from_bytes([3u8; 32]);
        let event = LedgerEvent::ConfigCancelled {
            op_hash,
            by: ParticipantHash::from_bytes([1u8; 32]),
        };
        assert_eq!(event.op_hash(), Some(op_hash));
        assert_eq!(event.family(), Some(EventFamily::Config));
        assert_eq!(event.phase(), Some(EventPhase::Cancelled));

        let init = LedgerEvent::VaultInitialized {
            participants: vec![],
            delays: vec![],
            required_approvals: vec![],
        };
        assert_eq!(init.op_hash(), None);
    }
}

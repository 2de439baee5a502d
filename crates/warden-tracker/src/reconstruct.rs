//! Pure pending-set reconstruction
//!
//! Pending = Scheduled − (Applied ∪ Cancelled), keyed by operation hash.
//! The fold works on an immutable [`EventSnapshot`] by set difference, so
//! the result does not depend on the order events arrived in.

use crate::operation::{
    classify_call, ConfigAction, DelayedOperation, OperationKind, OperationState,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use warden_core::effects::{EventFamily, EventPhase, EventRecord, LedgerEvent};
use warden_core::{Address, OpHash, Selector};

/// Immutable set of lifecycle events for one vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub events: Vec<EventRecord>,
}

impl FromIterator<EventRecord> for EventSnapshot {
    fn from_iter<I: IntoIterator<Item = EventRecord>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl EventSnapshot {
    /// Terminal state recorded for `op_hash`, if any.
    ///
    /// Cancelled wins if a malformed log carries both.
    pub fn terminal_state(&self, op_hash: &OpHash) -> Option<OperationState> {
        let mut state = None;
        for record in &self.events {
            if record.event.op_hash().as_ref() != Some(op_hash) {
                continue;
            }
            match record.event.phase() {
                Some(EventPhase::Cancelled) => return Some(OperationState::Cancelled),
                Some(EventPhase::Applied) => state = Some(OperationState::Applied),
                _ => {}
            }
        }
        state
    }

    /// Lifecycle state of `op_hash`, or `None` if it was never scheduled
    pub fn state_of(&self, op_hash: &OpHash) -> Option<OperationState> {
        if let Some(terminal) = self.terminal_state(op_hash) {
            return Some(terminal);
        }
        self.events
            .iter()
            .any(|r| {
                r.event.phase() == Some(EventPhase::Scheduled)
                    && r.event.op_hash().as_ref() == Some(op_hash)
            })
            .then_some(OperationState::Pending)
    }
}

/// Pending operations, split by whether an active bypass policy covers them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperations {
    pub operations: Vec<DelayedOperation>,
    pub bypass: Vec<DelayedOperation>,
}

impl PendingOperations {
    pub fn len(&self) -> usize {
        self.operations.len() + self.bypass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Both buckets merged, ordered by block then hash
    pub fn iter(&self) -> impl Iterator<Item = &DelayedOperation> {
        let mut merged: Vec<&DelayedOperation> =
            self.operations.iter().chain(&self.bypass).collect();
        merged.sort_by_key(|op| (op.block, op.op_hash));
        merged.into_iter()
    }

    pub fn find(&self, op_hash: &OpHash) -> Option<&DelayedOperation> {
        self.iter().find(|op| &op.op_hash == op_hash)
    }
}

/// Turn one scheduled event into a pending operation
pub fn to_pending(record: &EventRecord, token_selectors: &[Selector]) -> Option<DelayedOperation> {
    let (op_hash, family, kind, sender, due_time) = match &record.event {
        LedgerEvent::OperationScheduled(call) => (
            call.op_hash,
            EventFamily::Operation,
            classify_call(call, token_selectors),
            call.sender,
            call.due_time,
        ),
        LedgerEvent::ConfigScheduled(change) => (
            change.op_hash,
            EventFamily::Config,
            OperationKind::ConfigChange {
                actions: change.actions.iter().map(ConfigAction::decode).collect(),
            },
            change.sender,
            change.due_time,
        ),
        _ => return None,
    };
    Some(DelayedOperation {
        op_hash,
        family,
        kind,
        sender,
        due_time,
        state: OperationState::Pending,
        block: record.block,
        tx_hash: record.tx_hash,
    })
}

/// Reconstruct the pending set from a snapshot.
///
/// Generic operations whose target is in `bypass_policies` land in the
/// `bypass` bucket.
pub fn reconstruct(
    snapshot: &EventSnapshot,
    bypass_policies: &[Address],
    token_selectors: &[Selector],
) -> PendingOperations {
    let mut terminal: HashSet<OpHash> = HashSet::new();
    let mut scheduled: BTreeMap<OpHash, &EventRecord> = BTreeMap::new();

    for record in &snapshot.events {
        let Some(op_hash) = record.event.op_hash() else {
            continue;
        };
        match record.event.phase() {
            Some(EventPhase::Scheduled) => {
                // Keep the earliest copy of a re-delivered event
                scheduled
                    .entry(op_hash)
                    .and_modify(|existing| {
                        if (record.block, record.tx_hash) < (existing.block, existing.tx_hash) {
                            *existing = record;
                        }
                    })
                    .or_insert(record);
            }
            Some(EventPhase::Applied) | Some(EventPhase::Cancelled) => {
                terminal.insert(op_hash);
            }
            None => {}
        }
    }

    let mut pending: Vec<DelayedOperation> = scheduled
        .into_iter()
        .filter(|(op_hash, _)| !terminal.contains(op_hash))
        .filter_map(|(_, record)| to_pending(record, token_selectors))
        .collect();
    pending.sort_by_key(|op| (op.block, op.op_hash));

    let (bypass, operations) = pending.into_iter().partition(|op| {
        op.family == EventFamily::Operation
            && op
                .kind
                .call_target()
                .is_some_and(|(target, _)| bypass_policies.contains(&target))
    });

    PendingOperations { operations, bypass }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::effects::ScheduledCall;
    use warden_core::{ParticipantHash, TxHash};

    fn scheduled(seed: u8, block: u64, target: Address) -> EventRecord {
        EventRecord {
            vault: Address::from_bytes([0xfe; 20]),
            block,
            tx_hash: TxHash::from_bytes([block as u8; 32]),
            event: LedgerEvent::OperationScheduled(ScheduledCall {
                op_hash: OpHash::from_bytes([seed; 32]),
                sender: ParticipantHash::from_bytes([9u8; 32]),
                target,
                value: 10,
                data: vec![],
                due_time: 1_000 + block,
            }),
        }
    }

    fn cancelled(seed: u8, block: u64) -> EventRecord {
        EventRecord {
            vault: Address::from_bytes([0xfe; 20]),
            block,
            tx_hash: TxHash::from_bytes([block as u8; 32]),
            event: LedgerEvent::OperationCancelled {
                op_hash: OpHash::from_bytes([seed; 32]),
                by: ParticipantHash::from_bytes([8u8; 32]),
            },
        }
    }

    #[test]
    fn test_cancelled_removed_and_bypass_split() {
        let policy = Address::from_bytes([0xbb; 20]);
        let snapshot: EventSnapshot = vec![
            scheduled(1, 1, Address::from_bytes([0x01; 20])),
            scheduled(2, 2, policy),
            scheduled(3, 3, Address::from_bytes([0x03; 20])),
            cancelled(3, 4),
        ]
        .into_iter()
        .collect();

        let pending = reconstruct(&snapshot, &[policy], &[]);
        assert_eq!(pending.operations.len(), 1);
        assert_eq!(pending.operations[0].op_hash, OpHash::from_bytes([1u8; 32]));
        assert_eq!(pending.bypass.len(), 1);
        assert_eq!(pending.bypass[0].op_hash, OpHash::from_bytes([2u8; 32]));
        assert!(pending.find(&OpHash::from_bytes([3u8; 32])).is_none());
    }

    #[test]
    fn test_iter_interleaves_buckets_by_block() {
        let policy = Address::from_bytes([0xbb; 20]);
        let snapshot: EventSnapshot = vec![
            scheduled(4, 4, Address::from_bytes([0x04; 20])),
            scheduled(1, 1, Address::from_bytes([0x01; 20])),
            scheduled(3, 3, policy),
            scheduled(2, 2, policy),
        ]
        .into_iter()
        .collect();

        let pending = reconstruct(&snapshot, &[policy], &[]);
        let blocks: Vec<u64> = pending.iter().map(|op| op.block).collect();
        assert_eq!(blocks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_delivery_counted_once() {
        let event = scheduled(5, 7, Address::from_bytes([0x05; 20]));
        let snapshot: EventSnapshot = vec![event.clone(), event].into_iter().collect();
        assert_eq!(reconstruct(&snapshot, &[], &[]).len(), 1);
    }

    #[test]
    fn test_state_of() {
        let snapshot: EventSnapshot = vec![
            scheduled(1, 1, Address::ZERO),
            scheduled(2, 2, Address::ZERO),
            cancelled(2, 3),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            snapshot.state_of(&OpHash::from_bytes([1u8; 32])),
            Some(OperationState::Pending)
        );
        assert_eq!(
            snapshot.state_of(&OpHash::from_bytes([2u8; 32])),
            Some(OperationState::Cancelled)
        );
        assert_eq!(snapshot.state_of(&OpHash::from_bytes([9u8; 32])), None);
    }
}

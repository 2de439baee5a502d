//! In-memory vault ledger
//!
//! Models the parts of the vault contract Warden depends on: one-shot
//! initial configuration, delayed operations keyed by hash with due times
//! taken from the sender's delay level, permission-checked cancellation,
//! and an append-only event log with live notifications.

use crate::clock::ManualClock;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use warden_core::effects::{
    BlockNumber, BypassCall, ChangeType, EventFamily, EventFilter, EventRecord, InitialConfig,
    LedgerEffects, LedgerError, LedgerEvent, LedgerNotification, RawConfigAction, ScheduledCall,
    ScheduledConfigChange, Timestamp, TxReceipt, VaultDeployment,
};
use warden_core::hash::hasher;
use warden_core::{
    Address, OpHash, Participant, ParticipantHash, Permission, TxHash, VaultId,
};

const NOTIFICATION_CAPACITY: usize = 256;

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = hasher();
    for part in parts {
        h.update(part);
    }
    h.finalize()
}

#[derive(Debug, Clone)]
struct VaultRecord {
    deployed_block: BlockNumber,
    configured: bool,
    nonce: u64,
    participants: HashSet<ParticipantHash>,
    delays: Vec<u64>,
    bypass_targets: Vec<Address>,
}

impl VaultRecord {
    fn require_participant(&self, sender: &Participant) -> Result<(), LedgerError> {
        if self.participants.contains(&sender.id()) {
            Ok(())
        } else {
            Err(LedgerError::Rejected {
                reason: format!("{} is not a participant", sender.address),
            })
        }
    }

    fn delay_for(&self, sender: &Participant) -> Result<u64, LedgerError> {
        self.delays
            .get(sender.level.index())
            .copied()
            .ok_or_else(|| LedgerError::Rejected {
                reason: format!("no delay configured for level {}", sender.level),
            })
    }

    fn bump_nonce(&mut self, supplied: u64) -> Result<(), LedgerError> {
        if supplied != self.nonce {
            return Err(LedgerError::StaleState {
                expected: supplied,
                actual: self.nonce,
            });
        }
        self.nonce += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PendingOp {
    vault: Address,
    family: EventFamily,
    due_time: Timestamp,
    /// Participants that join the vault when this change applies
    joins: Vec<ParticipantHash>,
}

#[derive(Debug, Default)]
struct LedgerState {
    block: BlockNumber,
    vaults: HashMap<Address, VaultRecord>,
    events: Vec<EventRecord>,
    pending: HashMap<OpHash, PendingOp>,
    finalized: HashSet<OpHash>,
    query_failures: u32,
    cancel_failure: Option<LedgerError>,
    cancel_outage: bool,
    config_failure: Option<LedgerError>,
}

impl LedgerState {
    fn check_query(&mut self) -> Result<(), LedgerError> {
        if self.query_failures > 0 {
            self.query_failures -= 1;
            return Err(LedgerError::Unavailable {
                reason: "injected query failure".to_string(),
            });
        }
        Ok(())
    }

    fn vault(&self, vault: &Address) -> Result<&VaultRecord, LedgerError> {
        self.vaults.get(vault).ok_or_else(|| LedgerError::Rejected {
            reason: format!("unknown vault {vault}"),
        })
    }

    fn vault_mut(&mut self, vault: &Address) -> Result<&mut VaultRecord, LedgerError> {
        self.vaults.get_mut(vault).ok_or_else(|| LedgerError::Rejected {
            reason: format!("unknown vault {vault}"),
        })
    }

    /// Append events in a fresh block and track their lifecycle
    fn emit(&mut self, vault: Address, events: Vec<LedgerEvent>) -> TxReceipt {
        self.block += 1;
        let block = self.block;
        let tx_hash = TxHash::from_bytes(digest(&[
            b"tx",
            &block.to_be_bytes(),
            &(self.events.len() as u64).to_be_bytes(),
        ]));
        let records: Vec<EventRecord> = events
            .into_iter()
            .map(|event| EventRecord {
                vault,
                block,
                tx_hash,
                event,
            })
            .collect();
        self.events.extend(records.iter().cloned());
        TxReceipt {
            tx_hash,
            block,
            events: records,
        }
    }

    fn emit_one(&mut self, vault: Address, event: LedgerEvent) -> EventRecord {
        self.block += 1;
        let record = EventRecord {
            vault,
            block: self.block,
            tx_hash: TxHash::from_bytes(digest(&[
                b"tx",
                &self.block.to_be_bytes(),
                &(self.events.len() as u64).to_be_bytes(),
            ])),
            event,
        };
        self.events.push(record.clone());
        record
    }

    fn finalize(&mut self, op_hash: &OpHash, now: Timestamp) -> Option<EventRecord> {
        let entry = self.pending.get(op_hash)?;
        if now < entry.due_time {
            return None;
        }
        let entry = self.pending.remove(op_hash)?;
        self.finalized.insert(*op_hash);
        if let Some(record) = self.vaults.get_mut(&entry.vault) {
            record.participants.extend(entry.joins.iter().copied());
        }
        let event = match entry.family {
            EventFamily::Operation => LedgerEvent::OperationApplied { op_hash: *op_hash },
            EventFamily::Config => LedgerEvent::ConfigApplied { op_hash: *op_hash },
        };
        self.emit(entry.vault, vec![event]).events.into_iter().next()
    }
}

/// In-memory [`LedgerEffects`] handler driven by a [`ManualClock`]
pub struct MemoryLedger {
    clock: ManualClock,
    state: Mutex<LedgerState>,
    notifications: broadcast::Sender<LedgerNotification>,
    cancel_calls: AtomicUsize,
    cancel_latency: Mutex<Option<Duration>>,
}

impl MemoryLedger {
    pub fn new(clock: ManualClock) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            clock,
            state: Mutex::new(LedgerState::default()),
            notifications,
            cancel_calls: AtomicUsize::new(0),
            cancel_latency: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    fn publish(&self, records: &[EventRecord]) {
        for record in records {
            // No receivers is fine
            let _ = self.notifications.send(record.clone());
        }
    }

    /// Fail the next `count` read queries with `Unavailable`
    pub fn fail_next_queries(&self, count: u32) {
        self.state.lock().query_failures = count;
    }

    /// Fail the next cancellation with `err` regardless of state
    pub fn fail_next_cancel(&self, err: LedgerError) {
        self.state.lock().cancel_failure = Some(err);
    }

    /// Fail every cancellation with `Unavailable` until switched off
    pub fn set_cancel_outage(&self, down: bool) {
        self.state.lock().cancel_outage = down;
    }

    /// Fail the next `initial_config` with `err` before touching the vault
    pub fn fail_next_initial_config(&self, err: LedgerError) {
        self.state.lock().config_failure = Some(err);
    }

    /// Delay every cancellation by `latency` of tokio time
    pub fn set_cancel_latency(&self, latency: Duration) {
        *self.cancel_latency.lock() = Some(latency);
    }

    /// Number of `cancel_operation` calls received, successful or not
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Full event log in emission order
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.lock().events.clone()
    }

    pub fn set_bypass_targets(&self, vault: &Address, targets: Vec<Address>) {
        if let Some(record) = self.state.lock().vaults.get_mut(vault) {
            record.bypass_targets = targets;
        }
    }

    /// Append a raw event, bypassing contract checks.
    ///
    /// Scheduled events become pending, terminal events finalize.
    pub fn inject(&self, vault: Address, event: LedgerEvent) -> EventRecord {
        let record = {
            let mut state = self.state.lock();
            match &event {
                LedgerEvent::OperationScheduled(call) => {
                    state.pending.insert(
                        call.op_hash,
                        PendingOp {
                            vault,
                            family: EventFamily::Operation,
                            due_time: call.due_time,
                            joins: Vec::new(),
                        },
                    );
                }
                LedgerEvent::ConfigScheduled(change) => {
                    state.pending.insert(
                        change.op_hash,
                        PendingOp {
                            vault,
                            family: EventFamily::Config,
                            due_time: change.due_time,
                            joins: Vec::new(),
                        },
                    );
                }
                other => {
                    if let Some(op_hash) = other.op_hash() {
                        state.pending.remove(&op_hash);
                        state.finalized.insert(op_hash);
                    }
                }
            }
            state.emit_one(vault, event)
        };
        self.publish(std::slice::from_ref(&record));
        record
    }

    /// Apply one matured operation
    pub fn apply(&self, op_hash: &OpHash) -> Result<EventRecord, LedgerError> {
        let now = self.clock.now();
        let record = {
            let mut state = self.state.lock();
            let Some(entry) = state.pending.get(op_hash) else {
                return Err(LedgerError::AlreadyFinalized { op_hash: *op_hash });
            };
            if now < entry.due_time {
                return Err(LedgerError::Rejected {
                    reason: format!("{op_hash} not due until {}", entry.due_time),
                });
            }
            state.finalize(op_hash, now)
        };
        let record = record.ok_or(LedgerError::AlreadyFinalized { op_hash: *op_hash })?;
        self.publish(std::slice::from_ref(&record));
        Ok(record)
    }

    /// Apply every pending operation whose due time has passed
    pub fn apply_due(&self) -> Vec<EventRecord> {
        let now = self.clock.now();
        let applied = {
            let mut state = self.state.lock();
            let mut due: Vec<OpHash> = state
                .pending
                .iter()
                .filter(|(_, op)| op.due_time <= now)
                .map(|(hash, _)| *hash)
                .collect();
            due.sort();
            due.iter()
                .filter_map(|hash| state.finalize(hash, now))
                .collect::<Vec<_>>()
        };
        self.publish(&applied);
        applied
    }
}

#[async_trait]
impl LedgerEffects for MemoryLedger {
    async fn latest_block(&self) -> Result<BlockNumber, LedgerError> {
        let mut state = self.state.lock();
        state.check_query()?;
        Ok(state.block)
    }

    async fn deployed_block(&self, vault: &Address) -> Result<BlockNumber, LedgerError> {
        let mut state = self.state.lock();
        state.check_query()?;
        Ok(state.vault(vault)?.deployed_block)
    }

    async fn state_nonce(&self, vault: &Address) -> Result<u64, LedgerError> {
        let mut state = self.state.lock();
        state.check_query()?;
        Ok(state.vault(vault)?.nonce)
    }

    async fn bypass_policies(&self, vault: &Address) -> Result<Vec<Address>, LedgerError> {
        let mut state = self.state.lock();
        state.check_query()?;
        Ok(state.vault(vault)?.bypass_targets.clone())
    }

    async fn past_events(
        &self,
        vault: &Address,
        filter: EventFilter,
    ) -> Result<Vec<EventRecord>, LedgerError> {
        let mut state = self.state.lock();
        state.check_query()?;
        Ok(state
            .events
            .iter()
            .filter(|r| &r.vault == vault)
            .filter(|r| r.block >= filter.from_block && r.block <= filter.to_block)
            .filter(|r| r.event.family() == Some(filter.family))
            .filter(|r| r.event.phase() == Some(filter.phase))
            .cloned()
            .collect())
    }

    async fn create_vault(
        &self,
        vault_id: VaultId,
        deployer: &Address,
    ) -> Result<VaultDeployment, LedgerError> {
        let seed = digest(&[b"vault", vault_id.0.as_bytes(), deployer.as_bytes()]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&seed[..20]);
        let address = Address::from_bytes(bytes);

        let mut state = self.state.lock();
        if state.vaults.contains_key(&address) {
            return Err(LedgerError::Rejected {
                reason: format!("vault {vault_id} already created"),
            });
        }
        state.block += 1;
        let block = state.block;
        state.vaults.insert(
            address,
            VaultRecord {
                deployed_block: block,
                configured: false,
                nonce: 0,
                participants: HashSet::new(),
                delays: Vec::new(),
                bypass_targets: Vec::new(),
            },
        );
        tracing::debug!(%address, block, "created vault");
        Ok(VaultDeployment { address, block })
    }

    async fn initial_config(
        &self,
        vault: &Address,
        _sender: &Address,
        config: &InitialConfig,
    ) -> Result<TxReceipt, LedgerError> {
        let receipt = {
            let mut state = self.state.lock();
            if let Some(err) = state.config_failure.take() {
                return Err(err);
            }
            let record = state.vault_mut(vault)?;
            if record.configured {
                return Err(LedgerError::Rejected {
                    reason: "vault already initialized".to_string(),
                });
            }
            if config.participants.is_empty() {
                return Err(LedgerError::Rejected {
                    reason: "no participants".to_string(),
                });
            }
            if config.delays.len() != config.required_approvals_per_level.len() {
                return Err(LedgerError::Rejected {
                    reason: "delays and approvals differ in length".to_string(),
                });
            }
            if config.bypass_modules.len()
                != config.bypass_targets.len() + config.bypass_methods.len()
            {
                return Err(LedgerError::Rejected {
                    reason: "bypass modules do not match targets and methods".to_string(),
                });
            }
            record.configured = true;
            record.participants = config.participants.iter().copied().collect();
            record.delays = config.delays.clone();
            record.bypass_targets = config.bypass_targets.clone();

            state.emit(
                *vault,
                vec![LedgerEvent::VaultInitialized {
                    participants: config.participants.clone(),
                    delays: config.delays.clone(),
                    required_approvals: config.required_approvals_per_level.clone(),
                }],
            )
        };
        self.publish(&receipt.events);
        Ok(receipt)
    }

    async fn schedule_bypass_call(
        &self,
        vault: &Address,
        sender: &Participant,
        call: &BypassCall,
        state_nonce: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let now = self.clock.now();
        let receipt = {
            let mut state = self.state.lock();
            let record = state.vault_mut(vault)?;
            record.require_participant(sender)?;
            if !sender.permissions.contains(Permission::CanExecuteBypassCall) {
                return Err(LedgerError::Rejected {
                    reason: "sender cannot execute bypass calls".to_string(),
                });
            }
            let delay = record.delay_for(sender)?;
            record.bump_nonce(state_nonce)?;

            let op_hash = OpHash::from_bytes(digest(&[
                b"call",
                vault.as_bytes(),
                sender.id().as_bytes(),
                call.target.as_bytes(),
                &call.value.to_be_bytes(),
                &call.data,
                &state_nonce.to_be_bytes(),
            ]));
            let due_time = now + delay;
            state.pending.insert(
                op_hash,
                PendingOp {
                    vault: *vault,
                    family: EventFamily::Operation,
                    due_time,
                    joins: Vec::new(),
                },
            );
            state.emit(
                *vault,
                vec![LedgerEvent::OperationScheduled(ScheduledCall {
                    op_hash,
                    sender: sender.id(),
                    target: call.target,
                    value: call.value,
                    data: call.data.clone(),
                    due_time,
                })],
            )
        };
        self.publish(&receipt.events);
        Ok(receipt)
    }

    async fn add_operator_now(
        &self,
        vault: &Address,
        sender: &Participant,
        new_operator: &Participant,
        state_nonce: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let now = self.clock.now();
        let receipt = {
            let mut state = self.state.lock();
            let record = state.vault_mut(vault)?;
            record.require_participant(sender)?;
            if !sender.permissions.contains(Permission::CanAddOperatorNow) {
                return Err(LedgerError::Rejected {
                    reason: "sender cannot add operators".to_string(),
                });
            }
            let delay = record.delay_for(sender)?;
            record.bump_nonce(state_nonce)?;

            let operator_id = new_operator.id();
            let op_hash = OpHash::from_bytes(digest(&[
                b"config",
                vault.as_bytes(),
                sender.id().as_bytes(),
                operator_id.as_bytes(),
                &state_nonce.to_be_bytes(),
            ]));
            let due_time = now + delay;
            state.pending.insert(
                op_hash,
                PendingOp {
                    vault: *vault,
                    family: EventFamily::Config,
                    due_time,
                    joins: vec![operator_id],
                },
            );
            state.emit(
                *vault,
                vec![LedgerEvent::ConfigScheduled(ScheduledConfigChange {
                    op_hash,
                    sender: sender.id(),
                    actions: vec![RawConfigAction {
                        code: ChangeType::AddOperatorNow.code(),
                        arg1: operator_id.to_bytes(),
                        arg2: new_operator.address.to_word(),
                    }],
                    due_time,
                })],
            )
        };
        self.publish(&receipt.events);
        Ok(receipt)
    }

    async fn cancel_operation(
        &self,
        vault: &Address,
        sender: &Participant,
        family: EventFamily,
        op_hash: &OpHash,
    ) -> Result<TxReceipt, LedgerError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.cancel_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let now = self.clock.now();
        let receipt = {
            let mut state = self.state.lock();
            if let Some(err) = state.cancel_failure.take() {
                return Err(err);
            }
            if state.cancel_outage {
                return Err(LedgerError::Unavailable {
                    reason: "injected cancel outage".to_string(),
                });
            }
            let record = state.vault(vault)?;
            record.require_participant(sender)?;
            let needed = match family {
                EventFamily::Config => Permission::CanCancelConfigChanges,
                EventFamily::Operation => Permission::CanCancelBypassCall,
            };
            if !sender.permissions.contains(needed) {
                return Err(LedgerError::Rejected {
                    reason: format!("sender lacks {needed:?}"),
                });
            }

            let Some(entry) = state.pending.get(op_hash) else {
                if state.finalized.contains(op_hash) {
                    return Err(LedgerError::AlreadyFinalized { op_hash: *op_hash });
                }
                return Err(LedgerError::Rejected {
                    reason: format!("unknown operation {op_hash}"),
                });
            };
            if entry.vault != *vault || entry.family != family {
                return Err(LedgerError::Rejected {
                    reason: format!("operation {op_hash} does not belong to {vault}"),
                });
            }
            if now >= entry.due_time {
                return Err(LedgerError::Matured {
                    op_hash: *op_hash,
                    due_time: entry.due_time,
                });
            }

            state.pending.remove(op_hash);
            state.finalized.insert(*op_hash);
            let event = match family {
                EventFamily::Operation => LedgerEvent::OperationCancelled {
                    op_hash: *op_hash,
                    by: sender.id(),
                },
                EventFamily::Config => LedgerEvent::ConfigCancelled {
                    op_hash: *op_hash,
                    by: sender.id(),
                },
            };
            state.emit(*vault, vec![event])
        };
        self.publish(&receipt.events);
        Ok(receipt)
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerNotification> {
        self.notifications.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{participant, test_address};
    use assert_matches::assert_matches;
    use warden_core::Role;

    async fn configured_ledger() -> (MemoryLedger, Address, Participant, Participant) {
        let ledger = MemoryLedger::new(ManualClock::new(10_000));
        let owner = participant(1, Role::Owner, 0);
        let watchdog = participant(2, Role::Watchdog, 1);
        let deployment = ledger
            .create_vault(VaultId::new(), &owner.address)
            .await
            .unwrap();
        ledger
            .initial_config(
                &deployment.address,
                &owner.address,
                &InitialConfig {
                    participants: vec![owner.id(), watchdog.id()],
                    delays: vec![3_600, 86_400],
                    required_approvals_per_level: vec![0, 1],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (ledger, deployment.address, owner, watchdog)
    }

    #[tokio::test]
    async fn test_schedule_uses_sender_level_delay() {
        let (ledger, vault, owner, _) = configured_ledger().await;
        let receipt = ledger
            .schedule_bypass_call(
                &vault,
                &owner,
                &BypassCall {
                    target: test_address(9),
                    value: 5,
                    data: vec![],
                },
                0,
            )
            .await
            .unwrap();

        assert_matches!(
            &receipt.events[0].event,
            LedgerEvent::OperationScheduled(call) if call.due_time == 10_000 + 3_600
        );
        assert_eq!(ledger.state_nonce(&vault).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_nonce_rejected() {
        let (ledger, vault, owner, _) = configured_ledger().await;
        let call = BypassCall {
            target: test_address(9),
            value: 5,
            data: vec![],
        };
        let err = ledger
            .schedule_bypass_call(&vault, &owner, &call, 3)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::StaleState {
                expected: 3,
                actual: 0
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_lifecycle() {
        let (ledger, vault, owner, watchdog) = configured_ledger().await;
        let new_operator = participant(7, Role::Owner, 1);
        let receipt = ledger
            .add_operator_now(&vault, &owner, &new_operator, 0)
            .await
            .unwrap();
        let op_hash = receipt.events[0].event.op_hash().unwrap();

        ledger
            .cancel_operation(&vault, &watchdog, EventFamily::Config, &op_hash)
            .await
            .unwrap();
        let again = ledger
            .cancel_operation(&vault, &watchdog, EventFamily::Config, &op_hash)
            .await
            .unwrap_err();
        assert_matches!(again, LedgerError::AlreadyFinalized { .. });
        assert_eq!(ledger.cancel_calls(), 2);
    }

    #[tokio::test]
    async fn test_cancel_after_due_time_matures() {
        let (ledger, vault, owner, watchdog) = configured_ledger().await;
        let new_operator = participant(7, Role::Owner, 1);
        let receipt = ledger
            .add_operator_now(&vault, &owner, &new_operator, 0)
            .await
            .unwrap();
        let op_hash = receipt.events[0].event.op_hash().unwrap();

        ledger.clock().advance(3_600);
        let err = ledger
            .cancel_operation(&vault, &watchdog, EventFamily::Config, &op_hash)
            .await
            .unwrap_err();
        assert_matches!(err, LedgerError::Matured { due_time: 13_600, .. });

        let applied = ledger.apply_due();
        assert_eq!(applied.len(), 1);
        assert_matches!(applied[0].event, LedgerEvent::ConfigApplied { .. });
    }

    #[tokio::test]
    async fn test_injected_query_failures() {
        let (ledger, vault, _, _) = configured_ledger().await;
        ledger.fail_next_queries(1);
        assert_matches!(
            ledger.latest_block().await,
            Err(LedgerError::Unavailable { .. })
        );
        assert!(ledger.deployed_block(&vault).await.is_ok());
    }
}

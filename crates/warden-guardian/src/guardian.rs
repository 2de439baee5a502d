//! Guardian / watchdog
//!
//! Every newly scheduled operation on a watched vault is evaluated once:
//! it is authorized by a matching pre-registered intent, cancelled when
//! policy and cancel scope allow, or left for manual review. Cancellation
//! races the operation's due time; an operation that matures first is
//! reported on the alert channel and never silently dropped.

use crate::accounts::AccountRegistry;
use crate::intent::IntentRegistry;
use crate::task_registry::TaskRegistry;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use warden_core::effects::{
    EventFamily, EventPhase, EventRecord, LedgerEffects, LedgerError, PhysicalTimeEffects,
    Timestamp, TxReceipt,
};
use warden_core::{
    Address, DelayLevel, GuardianPolicy, OpHash, Participant, Permission, Result, RetryPolicy,
    Role, WardenConfig, WardenError,
};
use warden_tracker::reconstruct::to_pending;
use warden_tracker::{BlockWindow, DelayedOperation, OperationState, OperationTracker};

const ALERT_CAPACITY: usize = 64;

/// Finalized hashes remembered to absorb late re-deliveries
const FINALIZED_CAPACITY: usize = 4_096;

/// Final outcome of evaluating one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Matched and consumed an authorized intent
    Authorized,
    /// Cancellation confirmed by the ledger
    Cancelled,
    /// Left for manual review
    Ignored,
    /// Matured before a cancellation could be confirmed
    Escaped,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Decision::Authorized => "authorized",
            Decision::Cancelled => "cancelled",
            Decision::Ignored => "ignored",
            Decision::Escaped => "escaped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandledState {
    Evaluating,
    Decided(Decision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardianAlert {
    /// An operation the guardian meant to cancel went through
    Escaped {
        vault: Address,
        op_hash: OpHash,
        due_time: Timestamp,
        reason: String,
    },
}

#[derive(Debug)]
struct HandledOps {
    entries: HashMap<OpHash, HandledState>,
    /// Operations the ledger reported Applied or Cancelled, most recent
    /// `capacity` only
    finalized: HashSet<OpHash>,
    finalized_order: VecDeque<OpHash>,
    capacity: usize,
}

impl HandledOps {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            finalized: HashSet::new(),
            finalized_order: VecDeque::new(),
            capacity,
        }
    }

    fn finalize(&mut self, op_hash: OpHash) {
        self.entries.remove(&op_hash);
        if !self.finalized.insert(op_hash) {
            return;
        }
        self.finalized_order.push_back(op_hash);
        while self.finalized_order.len() > self.capacity {
            if let Some(oldest) = self.finalized_order.pop_front() {
                self.finalized.remove(&oldest);
            }
        }
    }
}

/// Watchdog over a set of vaults.
///
/// Cheap to clone; clones share handled state, watched vaults and the
/// alert channel.
#[derive(Clone)]
pub struct Guardian {
    ledger: Arc<dyn LedgerEffects>,
    clock: Arc<dyn PhysicalTimeEffects>,
    tracker: Arc<OperationTracker>,
    intents: Arc<IntentRegistry>,
    accounts: AccountRegistry,
    participant: Participant,
    policy: GuardianPolicy,
    cancel_margin_secs: u64,
    cancel_retry: RetryPolicy,
    watched: Arc<RwLock<BTreeSet<Address>>>,
    handled: Arc<Mutex<HandledOps>>,
    alerts: broadcast::Sender<GuardianAlert>,
}

impl Guardian {
    pub fn new(
        ledger: Arc<dyn LedgerEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        participant: Participant,
        intents: Arc<IntentRegistry>,
        accounts: AccountRegistry,
    ) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CAPACITY);
        Self {
            tracker: Arc::new(OperationTracker::new(ledger.clone())),
            ledger,
            clock,
            intents,
            accounts,
            participant,
            policy: GuardianPolicy::default(),
            cancel_margin_secs: 0,
            cancel_retry: RetryPolicy::exponential(),
            watched: Arc::new(RwLock::new(BTreeSet::new())),
            handled: Arc::new(Mutex::new(HandledOps::with_capacity(FINALIZED_CAPACITY))),
            alerts,
        }
    }

    /// Guardian holding watchdog permissions at `address`, configured from
    /// the `guardian`, `retry` and `tracker` sections
    pub fn from_config(
        ledger: Arc<dyn LedgerEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        address: Address,
        intents: Arc<IntentRegistry>,
        accounts: AccountRegistry,
        config: &WardenConfig,
    ) -> Self {
        let participant = Participant::new(
            address,
            Role::Watchdog,
            DelayLevel(config.guardian.level),
        );
        let tracker = OperationTracker::from_config(ledger.clone(), config);
        Self::new(ledger, clock, participant, intents, accounts)
            .with_policy(config.guardian.policy)
            .with_cancel_margin(config.guardian.cancel_margin_secs)
            .with_cancel_retry(config.retry.to_policy())
            .with_tracker(tracker)
    }

    pub fn with_policy(mut self, policy: GuardianPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Skip cancellations with fewer than `secs` seconds left
    pub fn with_cancel_margin(mut self, secs: u64) -> Self {
        self.cancel_margin_secs = secs;
        self
    }

    /// Backoff between cancellation attempts the ledger could not take.
    ///
    /// Attempts continue until the operation's deadline regardless of
    /// `max_attempts`.
    pub fn with_cancel_retry(mut self, retry: RetryPolicy) -> Self {
        self.cancel_retry = retry;
        self
    }

    pub fn with_tracker(mut self, tracker: OperationTracker) -> Self {
        self.tracker = Arc::new(tracker);
        self
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn policy(&self) -> GuardianPolicy {
        self.policy
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<GuardianAlert> {
        self.alerts.subscribe()
    }

    pub fn watch(&self, vault: Address) {
        if self.watched.write().insert(vault) {
            info!(%vault, "watching vault");
        }
    }

    pub fn unwatch(&self, vault: &Address) {
        self.watched.write().remove(vault);
    }

    pub fn is_watching(&self, vault: &Address) -> bool {
        self.watched.read().contains(vault)
    }

    pub fn watched_vaults(&self) -> Vec<Address> {
        self.watched.read().iter().copied().collect()
    }

    /// Where `op_hash` stands; `None` if idle or already finalized
    pub fn state_of(&self, op_hash: &OpHash) -> Option<HandledState> {
        self.handled.lock().entries.get(op_hash).copied()
    }

    /// Atomically move `op_hash` from idle to evaluating
    fn claim(&self, op_hash: &OpHash) -> bool {
        let mut handled = self.handled.lock();
        if handled.finalized.contains(op_hash) || handled.entries.contains_key(op_hash) {
            return false;
        }
        handled.entries.insert(*op_hash, HandledState::Evaluating);
        true
    }

    fn record(&self, op_hash: &OpHash, decision: Decision) {
        // A terminal event may already have cleared the entry
        if let Some(entry) = self.handled.lock().entries.get_mut(op_hash) {
            *entry = HandledState::Decided(decision);
        }
    }

    fn release(&self, op_hash: &OpHash) {
        let mut handled = self.handled.lock();
        if handled.entries.get(op_hash) == Some(&HandledState::Evaluating) {
            handled.entries.remove(op_hash);
        }
    }

    /// Forget `op_hash` after the ledger reports it applied or cancelled
    pub fn finalize(&self, op_hash: &OpHash) {
        self.handled.lock().finalize(*op_hash);
    }

    /// Whether the guardian's own permissions allow cancelling `op`
    pub fn in_cancel_scope(&self, op: &DelayedOperation) -> bool {
        let permissions = self.participant.permissions;
        match op.family {
            EventFamily::Config => permissions.contains(Permission::CanCancelConfigChanges),
            EventFamily::Operation => {
                permissions.contains(Permission::CanCancelBypassCall)
                    && (!op.kind.moves_value() || permissions.contains(Permission::CanCancelSpend))
            }
        }
    }

    fn policy_cancels(&self, op: &DelayedOperation) -> bool {
        match self.policy {
            GuardianPolicy::Watchdog => op.family == EventFamily::Config,
            GuardianPolicy::AutoCancel => true,
        }
    }

    /// Evaluate one pending operation.
    ///
    /// Returns `None` when the operation was already claimed by an earlier
    /// delivery. A failed evaluation releases the claim so a later sweep can
    /// retry it.
    pub async fn evaluate(&self, vault: &Address, op: &DelayedOperation) -> Result<Option<Decision>> {
        if !self.claim(&op.op_hash) {
            debug!(%vault, op_hash = %op.op_hash, "operation already handled");
            return Ok(None);
        }

        match self.decide(vault, op).await {
            Ok(decision) => {
                self.record(&op.op_hash, decision);
                info!(%vault, op_hash = %op.op_hash, outcome = %decision, "evaluated operation");
                Ok(Some(decision))
            }
            Err(err) => {
                self.release(&op.op_hash);
                warn!(%vault, op_hash = %op.op_hash, error = %err, "evaluation failed");
                Err(err)
            }
        }
    }

    async fn decide(&self, vault: &Address, op: &DelayedOperation) -> Result<Decision> {
        if let Some(account) = self.accounts.account_for_vault(vault).await {
            if let Some(intent) = self.intents.take_matching(&account.account_id, op) {
                info!(%vault, op_hash = %op.op_hash, title = %intent.title, "operation matches authorized intent");
                return Ok(Decision::Authorized);
            }
        }

        if !self.policy_cancels(op) {
            info!(%vault, op_hash = %op.op_hash, kind = ?op.kind, "leaving operation for review");
            return Ok(Decision::Ignored);
        }
        if !self.in_cancel_scope(op) {
            info!(%vault, op_hash = %op.op_hash, "operation outside cancel scope, leaving for review");
            return Ok(Decision::Ignored);
        }

        self.cancel(vault, op).await
    }

    async fn cancel(&self, vault: &Address, op: &DelayedOperation) -> Result<Decision> {
        let now = self.clock.now_secs().await?;
        let deadline = op.due_time.saturating_sub(self.cancel_margin_secs);
        if now >= deadline {
            return Ok(self.escaped(
                vault,
                op,
                format!("due at {} with clock at {now}", op.due_time),
            ));
        }

        let budget = Duration::from_secs(deadline - now);
        match tokio::time::timeout(budget, self.submit_cancel(vault, op)).await {
            Ok(Ok(receipt)) => {
                debug!(%vault, op_hash = %op.op_hash, block = receipt.block, "cancellation confirmed");
                Ok(Decision::Cancelled)
            }
            Ok(Err(LedgerError::Matured { due_time, .. })) => Ok(self.escaped(
                vault,
                op,
                format!("ledger reports maturity at {due_time}"),
            )),
            Ok(Err(LedgerError::AlreadyFinalized { .. })) => self.confirm_prior_cancel(vault, op).await,
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Ok(self.escaped(
                vault,
                op,
                format!("cancellation not confirmed within {budget:?}"),
            )),
        }
    }

    /// Submit the cancellation, retrying while the ledger is unavailable.
    ///
    /// Only the caller's deadline stops the retries.
    async fn submit_cancel(
        &self,
        vault: &Address,
        op: &DelayedOperation,
    ) -> std::result::Result<TxReceipt, LedgerError> {
        let mut attempt = 0u32;
        loop {
            match self
                .ledger
                .cancel_operation(vault, &self.participant, op.family, &op.op_hash)
                .await
            {
                Err(LedgerError::Unavailable { reason }) => {
                    let delay = self.cancel_retry.calculate_delay(attempt);
                    warn!(%vault, op_hash = %op.op_hash, attempt, ?delay, %reason, "cancellation not accepted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                outcome => return outcome,
            }
        }
    }

    /// The ledger says the operation is finalized; accept only a cancellation
    async fn confirm_prior_cancel(&self, vault: &Address, op: &DelayedOperation) -> Result<Decision> {
        match self.tracker.operation_state(vault, &op.op_hash).await? {
            OperationState::Cancelled => {
                debug!(%vault, op_hash = %op.op_hash, "operation was already cancelled");
                Ok(Decision::Cancelled)
            }
            state => Err(WardenError::duplicate_cancel(format!(
                "{} is {state:?}, not cancelled",
                op.op_hash
            ))),
        }
    }

    fn escaped(&self, vault: &Address, op: &DelayedOperation, reason: String) -> Decision {
        error!(
            %vault,
            op_hash = %op.op_hash,
            due_time = op.due_time,
            %reason,
            "unauthorized operation escaped cancellation"
        );
        // Nobody listening is not an error; the log line above still fires
        let _ = self.alerts.send(GuardianAlert::Escaped {
            vault: *vault,
            op_hash: op.op_hash,
            due_time: op.due_time,
            reason,
        });
        Decision::Escaped
    }

    /// React to one ledger notification.
    ///
    /// Scheduled events on watched vaults are evaluated; terminal events
    /// clear the handled entry.
    pub async fn handle_event(&self, record: &EventRecord) -> Result<Option<Decision>> {
        match record.event.phase() {
            Some(EventPhase::Scheduled) => {
                if !self.is_watching(&record.vault) {
                    return Ok(None);
                }
                let Some(op) = to_pending(record, self.tracker.token_selectors()) else {
                    return Ok(None);
                };
                self.evaluate(&record.vault, &op).await
            }
            Some(EventPhase::Applied) | Some(EventPhase::Cancelled) => {
                if let Some(op_hash) = record.event.op_hash() {
                    self.finalize(&op_hash);
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Evaluate the current pending set of every watched vault
    pub async fn sweep(&self) -> Result<Vec<(OpHash, Decision)>> {
        let mut outcomes = Vec::new();
        for vault in self.watched_vaults() {
            let pending = self.tracker.list_pending(&vault, BlockWindow::default()).await?;
            let results = join_all(pending.iter().map(|op| self.evaluate(&vault, op))).await;
            for (op, result) in pending.iter().zip(results) {
                match result {
                    Ok(Some(decision)) => outcomes.push((op.op_hash, decision)),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%vault, op_hash = %op.op_hash, error = %err, "sweep evaluation failed");
                    }
                }
            }
        }
        Ok(outcomes)
    }

    fn dispatch(&self, record: EventRecord, tasks: &TaskRegistry) {
        match record.event.phase() {
            Some(EventPhase::Scheduled) if self.is_watching(&record.vault) => {
                let guardian = self.clone();
                tasks.spawn_cancellable(async move {
                    if let Err(err) = guardian.handle_event(&record).await {
                        error!(
                            vault = %record.vault,
                            op_hash = ?record.event.op_hash(),
                            error = %err,
                            "operation left unguarded until the next sweep"
                        );
                    }
                });
            }
            Some(EventPhase::Applied) | Some(EventPhase::Cancelled) => {
                if let Some(op_hash) = record.event.op_hash() {
                    self.finalize(&op_hash);
                }
            }
            _ => {}
        }
    }

    /// Follow ledger notifications until `shutdown` flips to `true`.
    ///
    /// Subscribes before the startup sweep so nothing scheduled in between
    /// is missed. A lagged stream triggers another sweep.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut notifications = self.ledger.subscribe();
        let tasks = TaskRegistry::new();

        if let Err(err) = self.sweep().await {
            warn!(error = %err, "startup sweep failed");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = notifications.recv() => match received {
                    Ok(record) => self.dispatch(record, &tasks),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "ledger notifications lagged, sweeping");
                        if let Err(err) = self.sweep().await {
                            warn!(error = %err, "catch-up sweep failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("ledger notification stream closed");
                        break;
                    }
                },
            }
        }

        tasks.shutdown();
        info!("guardian stopped");
        Ok(())
    }
}

//! Shared fixture: one configured vault with an owner, the guardian's
//! watchdog entry and the recovery service's operator entry

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use warden_core::effects::{BypassCall, InitialConfig, LedgerEffects, TxReceipt};
use warden_core::{
    Address, DelayLevel, OpHash, Participant, Permission, Role, VaultId, ADMIN_PERMISSIONS,
};
use warden_guardian::{AccountRegistry, Guardian, IntentRegistry, RecoveryService};
use warden_testkit::{
    init_test_tracing, participant, test_address, ManualClock, MemoryLedger, RecordingTransport,
};
use warden_verify::{UnverifiedClaims, VerificationCodeService};

pub const OWNER_DELAY: u64 = 3_600;

pub struct Harness {
    pub clock: ManualClock,
    pub ledger: Arc<MemoryLedger>,
    pub transport: Arc<RecordingTransport>,
    pub intents: Arc<IntentRegistry>,
    pub accounts: AccountRegistry,
    pub vault: Address,
    pub owner: Participant,
    pub watchdog: Participant,
    pub operator: Participant,
}

impl Harness {
    pub async fn new() -> Self {
        init_test_tracing();
        let clock = ManualClock::default();
        let ledger = Arc::new(MemoryLedger::new(clock.clone()));
        let owner = participant(1, Role::Owner, 0);
        let watchdog = participant(2, Role::Watchdog, 1);
        let operator = Participant::new(
            test_address(3),
            ADMIN_PERMISSIONS.with(Permission::CanAddOperatorNow),
            DelayLevel(0),
        );

        let vault = ledger
            .create_vault(VaultId::new(), &owner.address)
            .await
            .unwrap()
            .address;
        ledger
            .initial_config(
                &vault,
                &owner.address,
                &InitialConfig {
                    participants: vec![owner.id(), watchdog.id(), operator.id()],
                    delays: vec![OWNER_DELAY, 86_400],
                    required_approvals_per_level: vec![0, 1],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        Self {
            clock,
            ledger,
            transport: Arc::new(RecordingTransport::new()),
            intents: Arc::new(IntentRegistry::new()),
            accounts: AccountRegistry::new(),
            vault,
            owner,
            watchdog,
            operator,
        }
    }

    pub fn guardian(&self) -> Guardian {
        let guardian = Guardian::new(
            self.ledger.clone(),
            Arc::new(self.clock.clone()),
            self.watchdog,
            self.intents.clone(),
            self.accounts.clone(),
        );
        guardian.watch(self.vault);
        guardian
    }

    pub fn recovery(&self) -> RecoveryService {
        RecoveryService::new(
            self.ledger.clone(),
            Arc::new(self.clock.clone()),
            self.transport.clone(),
            Arc::new(UnverifiedClaims),
            VerificationCodeService::new(b"guardian test seed".to_vec()),
            self.accounts.clone(),
            self.intents.clone(),
            self.operator,
        )
    }

    /// Owner schedules an immediate-looking transfer
    pub async fn schedule_transfer(&self, value: u128) -> TxReceipt {
        let nonce = self.ledger.state_nonce(&self.vault).await.unwrap();
        self.ledger
            .schedule_bypass_call(
                &self.vault,
                &self.owner,
                &BypassCall {
                    target: test_address(9),
                    value,
                    data: vec![],
                },
                nonce,
            )
            .await
            .unwrap()
    }

    /// `sender` schedules `add_operator_now` for `new_operator`
    pub async fn schedule_add_operator(
        &self,
        sender: &Participant,
        new_operator: &Participant,
    ) -> TxReceipt {
        let nonce = self.ledger.state_nonce(&self.vault).await.unwrap();
        self.ledger
            .add_operator_now(&self.vault, sender, new_operator, nonce)
            .await
            .unwrap()
    }

    pub fn was_cancelled(&self, op_hash: &OpHash) -> bool {
        self.ledger.events().iter().any(|r| {
            r.event.op_hash().as_ref() == Some(op_hash)
                && matches!(
                    r.event.phase(),
                    Some(warden_core::effects::EventPhase::Cancelled)
                )
        })
    }

    /// Poll until `cond` holds, yielding to spawned tasks in between
    pub async fn wait_until(&self, mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }
}

/// Last whitespace-separated token of a message body
pub fn code_in(body: &str) -> String {
    body.split_whitespace().last().unwrap().to_string()
}

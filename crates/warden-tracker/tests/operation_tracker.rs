//! Operation tracker against the in-memory ledger

use assert_matches::assert_matches;
use std::sync::Arc;
use std::time::Duration;
use warden_core::effects::{BypassCall, EventFamily, InitialConfig, LedgerEffects};
use warden_core::{Address, OpHash, Participant, RetryPolicy, Role, Selector, VaultId, WardenError};
use warden_testkit::{participant, test_address, ManualClock, MemoryLedger};
use warden_tracker::{BlockWindow, OperationKind, OperationState, OperationTracker};

struct Fixture {
    ledger: Arc<MemoryLedger>,
    vault: Address,
    owner: Participant,
    watchdog: Participant,
    nonce: u64,
}

impl Fixture {
    async fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new(ManualClock::new(50_000)));
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
        Self {
            ledger,
            vault: deployment.address,
            owner,
            watchdog,
            nonce: 0,
        }
    }

    fn tracker(&self) -> OperationTracker {
        OperationTracker::new(self.ledger.clone())
            .with_retry(RetryPolicy::exponential().with_initial_delay(Duration::from_millis(1)))
    }

    async fn schedule(&mut self, target: Address, value: u128, data: Vec<u8>) -> OpHash {
        let receipt = self
            .ledger
            .schedule_bypass_call(
                &self.vault,
                &self.owner,
                &BypassCall {
                    target,
                    value,
                    data,
                },
                self.nonce,
            )
            .await
            .unwrap();
        self.nonce += 1;
        receipt.events[0].event.op_hash().unwrap()
    }

    async fn add_operator(&mut self, seed: u8) -> OpHash {
        let operator = participant(seed, Role::Owner, 1);
        let receipt = self
            .ledger
            .add_operator_now(&self.vault, &self.owner, &operator, self.nonce)
            .await
            .unwrap();
        self.nonce += 1;
        receipt.events[0].event.op_hash().unwrap()
    }
}

fn token_transfer(to: Address, amount: u128) -> Vec<u8> {
    let mut data = Selector::TOKEN_TRANSFER.as_bytes().to_vec();
    data.extend_from_slice(&to.to_word());
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&amount.to_be_bytes());
    data
}

#[tokio::test]
async fn test_pending_excludes_cancelled_and_applied() {
    let mut fx = Fixture::new().await;
    let transfer = fx.schedule(test_address(9), 1_000, vec![]).await;
    let cancelled = fx.schedule(test_address(10), 5, vec![]).await;
    let config = fx.add_operator(7).await;

    fx.ledger
        .cancel_operation(&fx.vault, &fx.watchdog, EventFamily::Operation, &cancelled)
        .await
        .unwrap();

    let pending = fx
        .tracker()
        .list_pending(&fx.vault, BlockWindow::default())
        .await
        .unwrap();
    let hashes: Vec<OpHash> = pending.iter().map(|op| op.op_hash).collect();
    assert_eq!(hashes, vec![transfer, config]);
    assert!(pending.bypass.is_empty());

    let op = pending.find(&config).unwrap();
    assert_eq!(op.family, EventFamily::Config);
    assert_eq!(op.sender, fx.owner.id());
    assert_matches!(&op.kind, OperationKind::ConfigChange { actions } if actions.len() == 1);

    // Owner level 0 delay has elapsed; applied operations drop out
    fx.ledger.clock().advance(3_600);
    fx.ledger.apply(&transfer).unwrap();
    let pending = fx
        .tracker()
        .list_pending(&fx.vault, BlockWindow::default())
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending.find(&transfer).is_none());
}

#[tokio::test]
async fn test_classification_and_bypass_bucket() {
    let mut fx = Fixture::new().await;
    let policy_target = test_address(0x50);
    let token = test_address(0x60);
    fx.ledger.set_bypass_targets(&fx.vault, vec![policy_target]);

    let plain = fx.schedule(test_address(9), 7, vec![]).await;
    let token_op = fx
        .schedule(token, 0, token_transfer(test_address(0x61), 250))
        .await;
    let covered = fx.schedule(policy_target, 0, vec![0xde, 0xad, 0xbe, 0xef]).await;

    let pending = fx
        .tracker()
        .list_pending(&fx.vault, BlockWindow::default())
        .await
        .unwrap();

    assert_eq!(pending.operations.len(), 2);
    assert_matches!(
        pending.find(&plain).unwrap().kind,
        OperationKind::Transfer { value: 7, .. }
    );
    assert_matches!(
        &pending.find(&token_op).unwrap().kind,
        OperationKind::TokenTransfer { token: t, amount: 250, .. } if *t == token
    );
    assert_eq!(pending.bypass.len(), 1);
    assert_eq!(pending.bypass[0].op_hash, covered);
}

#[tokio::test]
async fn test_window_limits_scanned_blocks() {
    let mut fx = Fixture::new().await;
    let early = fx.schedule(test_address(9), 1, vec![]).await;
    let boundary = fx.ledger.latest_block().await.unwrap();
    let late = fx.schedule(test_address(9), 2, vec![]).await;

    let pending = fx
        .tracker()
        .list_pending(
            &fx.vault,
            BlockWindow {
                from: Some(boundary + 1),
                to: None,
            },
        )
        .await
        .unwrap();
    assert!(pending.find(&early).is_none());
    assert!(pending.find(&late).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_transient_query_failures_are_retried() {
    let mut fx = Fixture::new().await;
    let op = fx.schedule(test_address(9), 1, vec![]).await;

    fx.ledger.fail_next_queries(2);
    let pending = fx
        .tracker()
        .list_pending(&fx.vault, BlockWindow::default())
        .await
        .unwrap();
    assert!(pending.find(&op).is_some());
}

#[tokio::test]
async fn test_persistent_failure_surfaces_chain_unavailable() {
    let fx = Fixture::new().await;
    fx.ledger.fail_next_queries(10);
    let err = OperationTracker::new(fx.ledger.clone())
        .with_retry(RetryPolicy::none())
        .list_pending(&fx.vault, BlockWindow::default())
        .await
        .unwrap_err();
    assert_matches!(err, WardenError::ChainUnavailable { .. });
}

#[tokio::test]
async fn test_operation_state() {
    let mut fx = Fixture::new().await;
    let pending = fx.schedule(test_address(9), 1, vec![]).await;
    let cancelled = fx.add_operator(7).await;
    fx.ledger
        .cancel_operation(&fx.vault, &fx.watchdog, EventFamily::Config, &cancelled)
        .await
        .unwrap();

    let tracker = fx.tracker();
    assert_eq!(
        tracker.operation_state(&fx.vault, &pending).await.unwrap(),
        OperationState::Pending
    );
    assert_eq!(
        tracker.operation_state(&fx.vault, &cancelled).await.unwrap(),
        OperationState::Cancelled
    );
    assert_matches!(
        tracker
            .operation_state(&fx.vault, &OpHash::from_bytes([0x77; 32]))
            .await,
        Err(WardenError::NotFound { .. })
    );
}

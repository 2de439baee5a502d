//! Ledger-backed operation tracker

use crate::operation::OperationState;
use crate::reconstruct::{reconstruct, EventSnapshot, PendingOperations};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;
use warden_core::effects::{
    BlockNumber, EventFamily, EventFilter, EventPhase, EventRecord, LedgerEffects,
};
use warden_core::{
    Address, OpHash, Result, RetryPolicy, Selector, WardenConfig, WardenError,
};

const FAMILIES: [EventFamily; 2] = [EventFamily::Operation, EventFamily::Config];
const PHASES: [EventPhase; 3] = [
    EventPhase::Scheduled,
    EventPhase::Applied,
    EventPhase::Cancelled,
];

/// Inclusive block range to scan; `None` bounds default to the vault's
/// deployment block and the chain head
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: Option<BlockNumber>,
    pub to: Option<BlockNumber>,
}

/// Read-only view of a vault's delayed operations.
///
/// Every query re-derives state from the ledger; nothing is cached.
pub struct OperationTracker {
    ledger: Arc<dyn LedgerEffects>,
    retry: RetryPolicy,
    token_selectors: Vec<Selector>,
}

impl OperationTracker {
    pub fn new(ledger: Arc<dyn LedgerEffects>) -> Self {
        Self {
            ledger,
            retry: RetryPolicy::exponential(),
            token_selectors: vec![Selector::TOKEN_TRANSFER, Selector::TOKEN_APPROVE],
        }
    }

    pub fn from_config(ledger: Arc<dyn LedgerEffects>, config: &WardenConfig) -> Self {
        Self {
            ledger,
            retry: config.retry.to_policy(),
            token_selectors: config.tracker.token_selectors.clone(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_token_selectors(mut self, selectors: Vec<Selector>) -> Self {
        self.token_selectors = selectors;
        self
    }

    pub fn token_selectors(&self) -> &[Selector] {
        &self.token_selectors
    }

    async fn resolve_window(&self, vault: &Address, window: BlockWindow) -> Result<(BlockNumber, BlockNumber)> {
        let from = match window.from {
            Some(from) => from,
            None => {
                self.retry
                    .execute(|| async {
                        self.ledger
                            .deployed_block(vault)
                            .await
                            .map_err(WardenError::from)
                    })
                    .await?
            }
        };
        let to = match window.to {
            Some(to) => to,
            None => {
                self.retry
                    .execute(|| async { self.ledger.latest_block().await.map_err(WardenError::from) })
                    .await?
            }
        };
        Ok((from, to))
    }

    async fn query(&self, vault: &Address, filter: EventFilter) -> Result<Vec<EventRecord>> {
        self.retry
            .execute(|| async {
                self.ledger
                    .past_events(vault, filter)
                    .await
                    .map_err(WardenError::from)
            })
            .await
    }

    /// Fetch every lifecycle event of both families in `window`
    pub async fn snapshot(&self, vault: &Address, window: BlockWindow) -> Result<EventSnapshot> {
        let (from_block, to_block) = self.resolve_window(vault, window).await?;

        let queries = FAMILIES.iter().flat_map(|&family| {
            PHASES.iter().map(move |&phase| EventFilter {
                family,
                phase,
                from_block,
                to_block,
            })
        });
        let results = try_join_all(queries.map(|filter| self.query(vault, filter))).await?;

        Ok(results.into_iter().flatten().collect())
    }

    /// Operations scheduled and neither applied nor cancelled
    pub async fn list_pending(&self, vault: &Address, window: BlockWindow) -> Result<PendingOperations> {
        let snapshot = self.snapshot(vault, window).await?;
        let bypass_policies = self
            .retry
            .execute(|| async {
                self.ledger
                    .bypass_policies(vault)
                    .await
                    .map_err(WardenError::from)
            })
            .await?;

        let pending = reconstruct(&snapshot, &bypass_policies, &self.token_selectors);
        debug!(
            %vault,
            events = snapshot.events.len(),
            pending = pending.operations.len(),
            bypass = pending.bypass.len(),
            "reconstructed pending operations"
        );
        Ok(pending)
    }

    /// Lifecycle state of one operation over the vault's whole history
    pub async fn operation_state(&self, vault: &Address, op_hash: &OpHash) -> Result<OperationState> {
        let snapshot = self.snapshot(vault, BlockWindow::default()).await?;
        snapshot
            .state_of(op_hash)
            .ok_or_else(|| WardenError::not_found(format!("operation {op_hash} on {vault}")))
    }
}

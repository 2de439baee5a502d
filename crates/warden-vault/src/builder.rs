//! Config builder: the single writer of a vault's local change log

use crate::changes::LocalChange;
use crate::snapshot::VaultSnapshot;
use crate::state::{DeployProgress, VaultState};
use crate::storage::VaultStorage;
use std::sync::Arc;
use tracing::{debug, info};
use warden_core::effects::{LedgerEffects, VaultDeployment};
use warden_core::{
    Address, Participant, PermissionSet, Result, Selector, VaultId, WardenError,
};

/// Stages changes for one vault and performs its one-shot deployment.
///
/// Takes `&mut self` for every write, so a vault has at most one writer.
pub struct ConfigBuilder {
    state: VaultState,
    snapshot: VaultSnapshot,
    storage: Arc<dyn VaultStorage>,
}

impl std::fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConfigBuilder {
    /// Open an existing record, replaying its log
    pub fn open(state: VaultState, storage: Arc<dyn VaultStorage>) -> Result<Self> {
        let snapshot = state.replay()?;
        Ok(Self {
            state,
            snapshot,
            storage,
        })
    }

    pub fn id(&self) -> VaultId {
        self.state.id
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn local_changes(&self) -> &[LocalChange] {
        &self.state.local_changes
    }

    /// Current folded state
    pub fn snapshot(&self) -> &VaultSnapshot {
        &self.snapshot
    }

    /// Recompute the snapshot from the log alone
    pub fn replay(&self) -> Result<VaultSnapshot> {
        self.state.replay()
    }

    pub fn is_deployed(&self) -> bool {
        self.state.is_deployed()
    }

    fn require_undeployed(&self) -> Result<()> {
        if let Some(address) = self.state.address {
            return Err(WardenError::already_deployed(format!(
                "{} is deployed at {address}",
                self.state.id
            )));
        }
        Ok(())
    }

    fn require_unsealed(&self) -> Result<()> {
        self.require_undeployed()?;
        match self.state.deploy_progress {
            Some(progress) => Err(WardenError::already_deployed(format!(
                "{} has a deployment in progress at {}",
                self.state.id,
                progress.deployment().address
            ))),
            None => Ok(()),
        }
    }

    /// Validate and append one change, persisting the extended log.
    ///
    /// On any failure the log and snapshot are left as they were.
    pub async fn append(&mut self, change: LocalChange) -> Result<VaultSnapshot> {
        self.require_unsealed()?;
        let next = self.snapshot.apply(&change)?;
        let change_type = change.change_type();

        self.state.local_changes.push(change);
        if let Err(err) = self.storage.put_vault_state(&self.state).await {
            self.state.local_changes.pop();
            return Err(err);
        }
        self.snapshot = next;

        debug!(
            vault = %self.state.id,
            change = %change_type,
            changes = self.state.local_changes.len(),
            "appended local change"
        );
        Ok(self.snapshot.clone())
    }

    pub async fn add_participant(&mut self, participant: Participant) -> Result<VaultSnapshot> {
        self.append(LocalChange::AddParticipant { participant }).await
    }

    pub async fn remove_participant(&mut self, participant: Participant) -> Result<VaultSnapshot> {
        self.append(LocalChange::RemoveParticipant { participant })
            .await
    }

    pub async fn change_owner(&mut self, new_owner: Participant) -> Result<VaultSnapshot> {
        self.append(LocalChange::ChangeOwner { new_owner }).await
    }

    pub async fn change_permissions(
        &mut self,
        participant: Participant,
        permissions: impl Into<PermissionSet>,
    ) -> Result<VaultSnapshot> {
        self.append(LocalChange::ChangePermissions {
            participant,
            permissions: permissions.into(),
        })
        .await
    }

    pub async fn configure_levels(
        &mut self,
        delays: Vec<u64>,
        required_approvals: Vec<u32>,
    ) -> Result<VaultSnapshot> {
        self.append(LocalChange::ConfigureLevels {
            delays,
            required_approvals,
        })
        .await
    }

    pub async fn set_options(
        &mut self,
        allow_accelerated_calls: bool,
        allow_add_operator_now: bool,
    ) -> Result<VaultSnapshot> {
        self.append(LocalChange::SetOptions {
            allow_accelerated_calls,
            allow_add_operator_now,
        })
        .await
    }

    pub async fn add_bypass_method(
        &mut self,
        selector: Selector,
        module: Address,
    ) -> Result<VaultSnapshot> {
        self.append(LocalChange::AddBypassMethod { selector, module })
            .await
    }

    /// Create the vault on the ledger and submit its initial configuration.
    ///
    /// Each confirmed ledger step is recorded in the vault state before the
    /// next one starts, so a failed deploy resumes where it stopped instead
    /// of creating a second contract. The log is sealed once the first step
    /// succeeds. Irreversible: afterwards `append` and `deploy` fail with
    /// `VaultAlreadyDeployed`.
    pub async fn deploy(
        &mut self,
        ledger: &dyn LedgerEffects,
        deployer: &Address,
    ) -> Result<VaultDeployment> {
        self.require_undeployed()?;
        let config = self.snapshot.initial_config()?;

        let deployment = match self.state.deploy_progress {
            Some(DeployProgress::Configured(deployment)) => deployment,
            progress => {
                let deployment = match progress {
                    Some(DeployProgress::Created(deployment)) => {
                        debug!(vault = %self.state.id, address = %deployment.address, "resuming deployment");
                        deployment
                    }
                    _ => {
                        let deployment = ledger.create_vault(self.state.id, deployer).await?;
                        self.record_progress(DeployProgress::Created(deployment))
                            .await?;
                        deployment
                    }
                };
                let receipt = ledger
                    .initial_config(&deployment.address, deployer, &config)
                    .await?;
                debug!(vault = %self.state.id, config_tx = %receipt.tx_hash, "initial config confirmed");
                self.record_progress(DeployProgress::Configured(deployment))
                    .await?;
                deployment
            }
        };

        let mut sealed = self.state.clone();
        sealed.address = Some(deployment.address);
        sealed.deployed_block = Some(deployment.block);
        sealed.deploy_progress = None;
        self.storage.put_vault_state(&sealed).await?;
        self.state = sealed;
        self.snapshot.address = Some(deployment.address);

        info!(
            vault = %self.state.id,
            address = %deployment.address,
            block = deployment.block,
            participants = config.participants.len(),
            "vault deployed"
        );
        Ok(deployment)
    }

    /// Keep `progress` in memory even if storage rejects it; the ledger step
    /// it describes has already happened
    async fn record_progress(&mut self, progress: DeployProgress) -> Result<()> {
        self.state.deploy_progress = Some(progress);
        self.storage.put_vault_state(&self.state).await
    }
}

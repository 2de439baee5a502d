//! Persisted vault record

use crate::changes::LocalChange;
use crate::snapshot::VaultSnapshot;
use serde::{Deserialize, Serialize};
use warden_core::effects::VaultDeployment;
use warden_core::{Address, Participant, Result, VaultId};

/// Ledger steps already taken by an unfinished deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "deployment")]
pub enum DeployProgress {
    /// Contract exists, initial configuration not yet confirmed
    Created(VaultDeployment),
    /// Initial configuration confirmed, record not yet sealed
    Configured(VaultDeployment),
}

impl DeployProgress {
    pub fn deployment(&self) -> VaultDeployment {
        match self {
            DeployProgress::Created(d) | DeployProgress::Configured(d) => *d,
        }
    }
}

/// Everything stored for one vault.
///
/// Before deployment the record owns exactly one local change log. Once
/// `address` is set it never changes again and the log is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub id: VaultId,
    pub local_changes: Vec<LocalChange>,
    pub address: Option<Address>,
    pub deployed_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_progress: Option<DeployProgress>,
}

impl VaultState {
    /// New vault whose log holds only `Initialize { owner }`
    pub fn new(owner: Participant) -> Self {
        Self {
            id: VaultId::new(),
            local_changes: vec![LocalChange::Initialize { owner }],
            address: None,
            deployed_block: None,
            deploy_progress: None,
        }
    }

    pub fn is_deployed(&self) -> bool {
        self.address.is_some()
    }

    /// Deterministic fold of the log; depends on nothing but this record
    pub fn replay(&self) -> Result<VaultSnapshot> {
        let mut snapshot = VaultSnapshot::replay(self.id, &self.local_changes)?;
        snapshot.address = self.address;
        Ok(snapshot)
    }
}

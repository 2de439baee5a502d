//! Folded view of a vault's local change log

use crate::changes::LocalChange;
use serde::{Deserialize, Serialize};
use warden_core::effects::InitialConfig;
use warden_core::{
    Address, Participant, PermissionSet, Result, Selector, VaultId, WardenError, MAX_DELAY_LEVEL,
};

/// Delay levels a fresh vault starts with: one day, two days
pub const DEFAULT_DELAYS: [u64; 2] = [86_400, 172_800];
/// Approvals required per default level
pub const DEFAULT_REQUIRED_APPROVALS: [u32; 2] = [0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub delay_secs: u64,
    pub required_approvals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultOptions {
    pub allow_accelerated_calls: bool,
    pub allow_add_operator_now: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassMethod {
    pub selector: Selector,
    pub module: Address,
}

/// Result of replaying a local change log.
///
/// `owner` is also the first entry of `participants`; participants keep
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub id: VaultId,
    pub owner: Option<Participant>,
    pub participants: Vec<Participant>,
    pub levels: Vec<LevelConfig>,
    pub options: VaultOptions,
    pub bypass_methods: Vec<BypassMethod>,
    pub address: Option<Address>,
}

impl VaultSnapshot {
    /// State before any change is applied
    pub fn empty(id: VaultId) -> Self {
        Self {
            id,
            owner: None,
            participants: Vec::new(),
            levels: Vec::new(),
            options: VaultOptions::default(),
            bypass_methods: Vec::new(),
            address: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.owner.is_some()
    }

    pub fn find_participant(&self, participant: &Participant) -> Option<usize> {
        let id = participant.id();
        self.participants.iter().position(|p| p.id() == id)
    }

    fn require_initialized(&self, what: &str) -> Result<&Participant> {
        self.owner
            .as_ref()
            .ok_or_else(|| WardenError::invalid_change(format!("{what} before Initialize")))
    }

    fn require_level(&self, participant: &Participant) -> Result<()> {
        if participant.level.index() >= self.levels.len() {
            return Err(WardenError::invalid_change(format!(
                "level {} of {} is outside the {} configured levels",
                participant.level,
                participant.address,
                self.levels.len()
            )));
        }
        Ok(())
    }

    fn require_new_identity(&self, participant: &Participant) -> Result<()> {
        if self.find_participant(participant).is_some() {
            return Err(WardenError::invalid_change(format!(
                "participant {} already present",
                participant.id()
            )));
        }
        Ok(())
    }

    /// Validate `change` against this state and return the state after it.
    ///
    /// `self` is never modified, so a rejected change leaves nothing behind.
    pub fn apply(&self, change: &LocalChange) -> Result<VaultSnapshot> {
        let mut next = self.clone();
        match change {
            LocalChange::Initialize { owner } => {
                if self.is_initialized() {
                    return Err(WardenError::invalid_change("vault is already initialized"));
                }
                next.levels = DEFAULT_DELAYS
                    .iter()
                    .zip(DEFAULT_REQUIRED_APPROVALS)
                    .map(|(&delay_secs, required_approvals)| LevelConfig {
                        delay_secs,
                        required_approvals,
                    })
                    .collect();
                next.require_level(owner)?;
                next.owner = Some(*owner);
                next.participants = vec![*owner];
            }
            LocalChange::ChangeOwner { new_owner } => {
                let current = *self.require_initialized("ChangeOwner")?;
                self.require_new_identity(new_owner)?;
                self.require_level(new_owner)?;
                next.participants.retain(|p| p.id() != current.id());
                next.participants.insert(0, *new_owner);
                next.owner = Some(*new_owner);
            }
            LocalChange::AddParticipant { participant } => {
                self.require_initialized("AddParticipant")?;
                self.require_new_identity(participant)?;
                self.require_level(participant)?;
                next.participants.push(*participant);
            }
            LocalChange::RemoveParticipant { participant } => {
                let owner = *self.require_initialized("RemoveParticipant")?;
                if owner.id() == participant.id() {
                    return Err(WardenError::invalid_change(
                        "the owner cannot be removed; use ChangeOwner",
                    ));
                }
                let index = self.find_participant(participant).ok_or_else(|| {
                    WardenError::invalid_change(format!(
                        "participant {} is not part of the vault",
                        participant.id()
                    ))
                })?;
                next.participants.remove(index);
            }
            LocalChange::ChangePermissions {
                participant,
                permissions,
            } => {
                let owner = *self.require_initialized("ChangePermissions")?;
                if owner.id() == participant.id() {
                    return Err(WardenError::invalid_change(
                        "owner permissions are fixed; use ChangeOwner",
                    ));
                }
                let index = self.find_participant(participant).ok_or_else(|| {
                    WardenError::invalid_change(format!(
                        "participant {} is not part of the vault",
                        participant.id()
                    ))
                })?;
                let replacement = Participant::new(participant.address, *permissions, participant.level);
                check_permissions(*permissions)?;
                self.require_new_identity(&replacement)?;
                next.participants[index] = replacement;
            }
            LocalChange::ConfigureLevels {
                delays,
                required_approvals,
            } => {
                self.require_initialized("ConfigureLevels")?;
                if delays.is_empty() || delays.len() != required_approvals.len() {
                    return Err(WardenError::invalid_change(format!(
                        "{} delays and {} required approvals; need equal non-zero counts",
                        delays.len(),
                        required_approvals.len()
                    )));
                }
                if delays.len() > usize::from(MAX_DELAY_LEVEL) + 1 {
                    return Err(WardenError::invalid_change(format!(
                        "at most {} levels are supported",
                        usize::from(MAX_DELAY_LEVEL) + 1
                    )));
                }
                next.levels = delays
                    .iter()
                    .zip(required_approvals)
                    .map(|(&delay_secs, &required_approvals)| LevelConfig {
                        delay_secs,
                        required_approvals,
                    })
                    .collect();
                for participant in &self.participants {
                    next.require_level(participant)?;
                }
            }
            LocalChange::SetOptions {
                allow_accelerated_calls,
                allow_add_operator_now,
            } => {
                self.require_initialized("SetOptions")?;
                next.options = VaultOptions {
                    allow_accelerated_calls: *allow_accelerated_calls,
                    allow_add_operator_now: *allow_add_operator_now,
                };
            }
            LocalChange::AddBypassMethod { selector, module } => {
                self.require_initialized("AddBypassMethod")?;
                if self.bypass_methods.iter().any(|m| m.selector == *selector) {
                    return Err(WardenError::invalid_change(format!(
                        "bypass method {selector} already configured"
                    )));
                }
                next.bypass_methods.push(BypassMethod {
                    selector: *selector,
                    module: *module,
                });
            }
        }
        Ok(next)
    }

    /// Left-fold `changes` starting from the empty state
    pub fn replay<'a, I>(id: VaultId, changes: I) -> Result<VaultSnapshot>
    where
        I: IntoIterator<Item = &'a LocalChange>,
    {
        let mut changes = changes.into_iter();
        match changes.next() {
            Some(first @ LocalChange::Initialize { .. }) => {
                let start = VaultSnapshot::empty(id).apply(first)?;
                changes.try_fold(start, |state, change| state.apply(change))
            }
            Some(other) => Err(WardenError::invalid_change(format!(
                "log must start with Initialize, found {}",
                other.change_type()
            ))),
            None => Ok(VaultSnapshot::empty(id)),
        }
    }

    /// Parameters of the one-shot `initial_config` ledger call
    pub fn initial_config(&self) -> Result<InitialConfig> {
        self.require_initialized("deploy")?;
        Ok(InitialConfig {
            participants: self.participants.iter().map(Participant::id).collect(),
            delays: self.levels.iter().map(|l| l.delay_secs).collect(),
            allow_accelerated_calls: self.options.allow_accelerated_calls,
            allow_add_operator_now: self.options.allow_add_operator_now,
            required_approvals_per_level: self
                .levels
                .iter()
                .map(|l| l.required_approvals)
                .collect(),
            bypass_targets: Vec::new(),
            bypass_methods: self.bypass_methods.iter().map(|m| m.selector).collect(),
            bypass_modules: self.bypass_methods.iter().map(|m| m.module).collect(),
        })
    }
}

fn check_permissions(permissions: PermissionSet) -> Result<()> {
    if permissions.is_empty() {
        return Err(WardenError::invalid_change("participant needs at least one permission"));
    }
    Ok(())
}

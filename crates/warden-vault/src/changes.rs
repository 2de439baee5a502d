//! Staged configuration changes for a vault that has not been deployed

use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::{Address, Participant, PermissionSet, Selector};

/// One entry of a vault's local change log.
///
/// The log is ordered and append-only; the first entry is always
/// [`LocalChange::Initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocalChange {
    Initialize {
        owner: Participant,
    },
    ChangeOwner {
        new_owner: Participant,
    },
    AddParticipant {
        participant: Participant,
    },
    RemoveParticipant {
        participant: Participant,
    },
    ChangePermissions {
        participant: Participant,
        permissions: PermissionSet,
    },
    ConfigureLevels {
        delays: Vec<u64>,
        required_approvals: Vec<u32>,
    },
    SetOptions {
        allow_accelerated_calls: bool,
        allow_add_operator_now: bool,
    },
    AddBypassMethod {
        selector: Selector,
        module: Address,
    },
}

/// Discriminant of a [`LocalChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalChangeType {
    Initialize,
    ChangeOwner,
    AddParticipant,
    RemoveParticipant,
    ChangePermissions,
    ConfigureLevels,
    SetOptions,
    AddBypassMethod,
}

impl LocalChange {
    pub fn change_type(&self) -> LocalChangeType {
        match self {
            LocalChange::Initialize { .. } => LocalChangeType::Initialize,
            LocalChange::ChangeOwner { .. } => LocalChangeType::ChangeOwner,
            LocalChange::AddParticipant { .. } => LocalChangeType::AddParticipant,
            LocalChange::RemoveParticipant { .. } => LocalChangeType::RemoveParticipant,
            LocalChange::ChangePermissions { .. } => LocalChangeType::ChangePermissions,
            LocalChange::ConfigureLevels { .. } => LocalChangeType::ConfigureLevels,
            LocalChange::SetOptions { .. } => LocalChangeType::SetOptions,
            LocalChange::AddBypassMethod { .. } => LocalChangeType::AddBypassMethod,
        }
    }
}

impl fmt::Display for LocalChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocalChangeType::Initialize => "initialize",
            LocalChangeType::ChangeOwner => "change_owner",
            LocalChangeType::AddParticipant => "add_participant",
            LocalChangeType::RemoveParticipant => "remove_participant",
            LocalChangeType::ChangePermissions => "change_permissions",
            LocalChangeType::ConfigureLevels => "configure_levels",
            LocalChangeType::SetOptions => "set_options",
            LocalChangeType::AddBypassMethod => "add_bypass_method",
        };
        f.write_str(name)
    }
}

//! Vault participants and their on-chain identity

use crate::hash::hasher;
use crate::identifiers::{Address, ParticipantHash};
use crate::permissions::{PermissionSet, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest delay level the contract can encode (5 bits)
pub const MAX_DELAY_LEVEL: u8 = 0x1F;

/// Delay tier determining how long a scheduled operation waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelayLevel(pub u8);

impl DelayLevel {
    /// Index into the per-level delay table
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for DelayLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// `(address, permissions, level)` tuple authorized to act on a vault.
///
/// Any field change produces a different [`ParticipantHash`]; there is no
/// in-place update, only remove + add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub address: Address,
    pub permissions: PermissionSet,
    pub level: DelayLevel,
}

impl Participant {
    pub fn new(address: Address, permissions: impl Into<PermissionSet>, level: DelayLevel) -> Self {
        Self {
            address,
            permissions: permissions.into(),
            level,
        }
    }

    /// On-chain identity: `H(address ‖ permissions_be16 ‖ level)`
    pub fn id(&self) -> ParticipantHash {
        let mut h = hasher();
        h.update(self.address.as_bytes())
            .update(&self.permissions.bits().to_be_bytes())
            .update(&[self.level.0]);
        ParticipantHash::from_bytes(h.finalize())
    }

    /// Named role if the permissions match one exactly
    pub fn role(&self) -> Option<Role> {
        Role::classify(self.permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permission;

    #[test]
    fn identity_changes_with_every_field() {
        let base = Participant::new(Address::from_bytes([1; 20]), Role::Admin, DelayLevel(1));
        let other_addr = Participant {
            address: Address::from_bytes([2; 20]),
            ..base
        };
        let other_perms = Participant {
            permissions: base.permissions.with(Permission::CanSpend),
            ..base
        };
        let other_level = Participant {
            level: DelayLevel(2),
            ..base
        };

        assert_eq!(base.id(), base.id());
        assert_ne!(base.id(), other_addr.id());
        assert_ne!(base.id(), other_perms.id());
        assert_ne!(base.id(), other_level.id());
    }

    #[test]
    fn role_lookup() {
        let watchdog = Participant::new(Address::ZERO, Role::Watchdog, DelayLevel(1));
        assert_eq!(watchdog.role(), Some(Role::Watchdog));
    }
}

//! Participant capabilities and named roles
//!
//! A [`PermissionSet`] is a `u16` bitmask over [`Permission`]. Bit positions
//! match the vault contract, including the unused bit 14. Named roles are
//! `const` OR-compositions; every combinator takes `self` by value and returns
//! a new set, so a role constant can never be altered through a holder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Single capability bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Permission {
    CanSpend = 1 << 0,
    CanUnfreeze = 1 << 1,
    CanChangeParticipants = 1 << 2,
    CanChangeBypass = 1 << 3,
    CanSignBoosts = 1 << 4,
    CanExecuteBoosts = 1 << 5,
    CanFreeze = 1 << 6,
    CanCancelConfigChanges = 1 << 7,
    CanCancelSpend = 1 << 8,
    CanApprove = 1 << 9,
    CanAddOperator = 1 << 10,
    CanExecuteBypassCall = 1 << 11,
    CanCancelBypassCall = 1 << 12,
    CanSetAcceleratedCalls = 1 << 13,
    CanAddOperatorNow = 1 << 15,
}

impl Permission {
    /// Every defined capability, lowest bit first
    pub const ALL: [Permission; 15] = [
        Permission::CanSpend,
        Permission::CanUnfreeze,
        Permission::CanChangeParticipants,
        Permission::CanChangeBypass,
        Permission::CanSignBoosts,
        Permission::CanExecuteBoosts,
        Permission::CanFreeze,
        Permission::CanCancelConfigChanges,
        Permission::CanCancelSpend,
        Permission::CanApprove,
        Permission::CanAddOperator,
        Permission::CanExecuteBypassCall,
        Permission::CanCancelBypassCall,
        Permission::CanSetAcceleratedCalls,
        Permission::CanAddOperatorNow,
    ];

    /// Raw bit value
    pub const fn bit(self) -> u16 {
        self as u16
    }
}

/// Immutable capability bitmask
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u16);

impl PermissionSet {
    /// No capabilities
    pub const EMPTY: PermissionSet = PermissionSet(0);

    /// Mask of every defined bit
    pub const DEFINED_BITS: u16 = {
        let mut bits = 0u16;
        let mut i = 0;
        while i < Permission::ALL.len() {
            bits |= Permission::ALL[i].bit();
            i += 1;
        }
        bits
    };

    /// Build from raw bits, rejecting undefined positions
    pub const fn from_bits(bits: u16) -> Option<Self> {
        if bits & !Self::DEFINED_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Raw bits as encoded on-chain
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Set containing exactly one capability
    pub const fn single(permission: Permission) -> Self {
        Self(permission.bit())
    }

    /// New set with `permission` added; `self` is untouched
    #[must_use]
    pub const fn with(self, permission: Permission) -> Self {
        Self(self.0 | permission.bit())
    }

    /// New set with `permission` removed; `self` is untouched
    #[must_use]
    pub const fn without(self, permission: Permission) -> Self {
        Self(self.0 & !permission.bit())
    }

    /// Union of two sets
    #[must_use]
    pub const fn union(self, other: PermissionSet) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether `permission` is granted
    pub const fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    /// Whether every bit in `other` is granted
    pub const fn contains_all(self, other: PermissionSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no capability is granted
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Granted capabilities, lowest bit first
    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl BitOr<Permission> for PermissionSet {
    type Output = PermissionSet;

    fn bitor(self, rhs: Permission) -> PermissionSet {
        self.with(rhs)
    }
}

impl BitOr for PermissionSet {
    type Output = PermissionSet;

    fn bitor(self, rhs: PermissionSet) -> PermissionSet {
        self.union(rhs)
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

const fn compose(perms: &[Permission]) -> PermissionSet {
    let mut bits = 0u16;
    let mut i = 0;
    while i < perms.len() {
        bits |= perms[i].bit();
        i += 1;
    }
    PermissionSet(bits)
}

/// Everything needed to reconfigure the vault
pub const CAN_CHANGE_CONFIG: PermissionSet = compose(&[
    Permission::CanUnfreeze,
    Permission::CanChangeParticipants,
    Permission::CanAddOperator,
    Permission::CanAddOperatorNow,
    Permission::CanChangeBypass,
    Permission::CanSetAcceleratedCalls,
]);

/// Every cancel capability
pub const CAN_CANCEL: PermissionSet = compose(&[
    Permission::CanCancelSpend,
    Permission::CanCancelConfigChanges,
    Permission::CanCancelBypassCall,
]);

pub const OWNER_PERMISSIONS: PermissionSet = CAN_CANCEL.union(CAN_CHANGE_CONFIG).union(compose(&[
    Permission::CanSpend,
    Permission::CanFreeze,
    Permission::CanSignBoosts,
    Permission::CanExecuteBypassCall,
]));

pub const ADMIN_PERMISSIONS: PermissionSet =
    compose(&[Permission::CanExecuteBoosts, Permission::CanAddOperator]);

pub const WATCHDOG_PERMISSIONS: PermissionSet =
    CAN_CANCEL.union(compose(&[Permission::CanFreeze, Permission::CanApprove]));

/// Named participant role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Admin,
    Watchdog,
}

impl Role {
    /// The role's fixed capability set
    pub const fn permissions(self) -> PermissionSet {
        match self {
            Role::Owner => OWNER_PERMISSIONS,
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Watchdog => WATCHDOG_PERMISSIONS,
        }
    }

    /// Map a bitmask back to a named role when it matches exactly
    pub fn classify(permissions: PermissionSet) -> Option<Role> {
        [Role::Owner, Role::Admin, Role::Watchdog]
            .into_iter()
            .find(|role| role.permissions() == permissions)
    }
}

impl From<Role> for PermissionSet {
    fn from(role: Role) -> Self {
        role.permissions()
    }
}

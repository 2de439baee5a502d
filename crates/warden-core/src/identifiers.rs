//! Address, hash, and vault identifiers
//!
//! Fixed-size byte identifiers render as `0x`-prefixed lowercase hex and
//! serialize as hex strings so stored vault state and configuration files stay
//! readable.

use crate::errors::WardenError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Parse `0x`-prefixed (or bare) hex into a fixed-size array.
fn parse_hex_array<const N: usize>(input: &str, what: &str) -> Result<[u8; N], WardenError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed)
        .map_err(|e| WardenError::invalid(format!("invalid {what} '{input}': {e}")))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        WardenError::invalid(format!(
            "invalid {what} '{input}': expected {N} bytes, got {len}"
        ))
    })
}

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr, $what:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Wrap raw bytes
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Copy out the raw bytes
            pub fn to_bytes(self) -> [u8; $len] {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = WardenError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex_array::<$len>(s, $what).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// 20-byte ledger account address
    Address,
    20,
    "address"
);

hex_identifier!(
    /// Hash identifying a delayed operation on the ledger
    OpHash,
    32,
    "operation hash"
);

hex_identifier!(
    /// On-chain participant identity: `H(address ‖ permissions ‖ level)`
    ParticipantHash,
    32,
    "participant hash"
);

hex_identifier!(
    /// Guardian-side account identifier, `H(email)`
    AccountId,
    32,
    "account id"
);

hex_identifier!(
    /// Ledger transaction hash
    TxHash,
    32,
    "transaction hash"
);

hex_identifier!(
    /// Four-byte call-data method selector
    Selector,
    4,
    "selector"
);

impl Address {
    /// The all-zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Left-pad into a 32-byte ABI word
    pub fn to_word(self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Extract from a 32-byte ABI word; the 12 high bytes must be zero
    pub fn from_word(word: &[u8; 32]) -> Option<Self> {
        if word[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Some(Self(bytes))
    }
}

impl AccountId {
    /// Derive the account id for an email identity
    pub fn for_email(email: &str) -> Self {
        Self(crate::hash::hash(email.trim().to_lowercase().as_bytes()))
    }
}

impl Selector {
    /// `transfer(address,uint256)`
    pub const TOKEN_TRANSFER: Selector = Selector([0xa9, 0x05, 0x9c, 0xbb]);
    /// `approve(address,uint256)`
    pub const TOKEN_APPROVE: Selector = Selector([0x09, 0x5e, 0xa7, 0xb3]);

    /// Leading selector of call data, if long enough
    pub fn of_call_data(data: &[u8]) -> Option<Self> {
        let head: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some(Self(head))
    }
}

/// Local identifier of a staged vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultId(pub Uuid);

impl VaultId {
    /// Fresh random vault id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VaultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vault-{}", self.0)
    }
}

//! Warden Vault - Local Change Log and Config Builder
//!
//! A vault is staged locally as an ordered, append-only log of
//! [`LocalChange`]s starting with `Initialize`. Replaying the log is a pure
//! left-fold into a [`VaultSnapshot`]; two builders sharing only the log reach
//! identical state. Deployment translates the snapshot into the ledger's
//! one-shot initial configuration and seals the log for good.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Contacts and their participant tuples
pub mod address_book;

/// Single-writer change staging and deployment
pub mod builder;

/// Local change variants
pub mod changes;

/// Vault creation and reopening
pub mod manager;

/// Replayed vault state
pub mod snapshot;

/// Persisted vault record
pub mod state;

/// Storage abstraction and in-memory handler
pub mod storage;

pub use address_book::{AddressBook, Contact};
pub use builder::ConfigBuilder;
pub use changes::{LocalChange, LocalChangeType};
pub use manager::VaultManager;
pub use snapshot::{BypassMethod, LevelConfig, VaultOptions, VaultSnapshot};
pub use state::{DeployProgress, VaultState};
pub use storage::{MemoryVaultStorage, OwnedAccount, VaultStorage};

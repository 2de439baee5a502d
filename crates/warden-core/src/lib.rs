//! Warden Core - Shared Vault Model
//!
//! Foundation types shared by every Warden service: the permission and role
//! model, participants and their on-chain identity, fixed-size identifiers,
//! the unified error, configuration, and the effect interfaces through which
//! services reach the ledger, clock, message transport and identity provider.
//!
//! # Architecture Layers
//!
//! ## Domain Model
//! - `PermissionSet`: `u16` capability bitmask matching the vault contract
//! - `Role`: immutable Owner / Admin / Watchdog compositions
//! - `Participant`: `(address, permissions, level)`, identified by `H(...)`
//!
//! ## Effect Interfaces (Pure Signatures)
//! - `LedgerEffects`: event queries, vault creation, delayed calls, cancellation
//! - `PhysicalTimeEffects`: wall-clock seconds
//! - `MessagingTransport`: SMS-style delivery
//! - `IdentityVerifier`: opaque token → `{email, nonce}`
//!
//! ## Ambient
//! - `WardenConfig`: TOML + environment layered configuration
//! - `RetryPolicy`: backoff for transient ledger failures
//! - `telemetry::init_tracing`: `tracing-subscriber` installation

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Layered service configuration
pub mod config;

/// Effect interfaces for external collaborators
pub mod effects;

/// Unified error handling
pub mod errors;

/// Workspace hash function
pub mod hash;

/// Addresses, operation hashes and vault ids
pub mod identifiers;

/// Participants and delay levels
pub mod participant;

/// Capability bits and named roles
pub mod permissions;

/// Retry and backoff
pub mod reliability;

/// Tracing subscriber setup
pub mod telemetry;

pub use config::{GuardianPolicy, LoggingConfig, WardenConfig};
pub use errors::{Result, WardenError};
pub use identifiers::{
    AccountId, Address, OpHash, ParticipantHash, Selector, TxHash, VaultId,
};
pub use participant::{DelayLevel, Participant, MAX_DELAY_LEVEL};
pub use permissions::{
    Permission, PermissionSet, Role, ADMIN_PERMISSIONS, CAN_CANCEL, CAN_CHANGE_CONFIG,
    OWNER_PERMISSIONS, WATCHDOG_PERMISSIONS,
};
pub use reliability::{BackoffStrategy, RetryPolicy};

/// Crate-wide result alias
pub type WardenResult<T> = Result<T>;

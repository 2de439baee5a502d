//! Warden Guardian - Watchdog and Recovery Service
//!
//! The guardian holds a participant entry in each watched vault and uses it
//! to cancel operations nobody authorized before their delay elapses.
//!
//! # Architecture Layers
//!
//! ## Decision
//! - `Guardian::evaluate`: intent match → policy + cancel scope → cancel or ignore
//! - Each operation hash is claimed once; terminal ledger events release it
//!
//! ## Event Loop
//! - `Guardian::run`: startup sweep, then one task per scheduled event
//! - Escaped operations are published as `GuardianAlert`s
//!
//! ## Recovery
//! - `RecoveryService`: phone validation, account creation, new-operator
//!   requests gated by verification codes
//! - `IntentRegistry`: one-shot authorizations consumed by the guardian

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Verified accounts and vault bindings
pub mod accounts;

/// Watchdog evaluation and event loop
pub mod guardian;

/// One-shot authorized intents
pub mod intent;

/// Account and operator recovery flow
pub mod recovery;

/// Spawned task tracking
pub mod task_registry;

pub use accounts::{Account, AccountRegistry};
pub use guardian::{Decision, Guardian, GuardianAlert, HandledState};
pub use intent::{AuthorizedIntent, IntentRegistry, IntentTarget};
pub use recovery::{NewOperator, OperatorRequest, RecoveryService};
pub use task_registry::TaskRegistry;

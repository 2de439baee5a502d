//! Effect interfaces for external collaborators
//!
//! Pure signatures only. Production handlers live outside this workspace;
//! `warden-testkit` supplies in-memory handlers for tests.

pub mod identity;
pub mod ledger;
pub mod messaging;
pub mod time;

pub use identity::{IdentityClaims, IdentityVerifier};
pub use ledger::{
    BlockNumber, BypassCall, ChangeType, EventFamily, EventFilter, EventPhase, EventRecord, InitialConfig,
    LedgerEffects, LedgerError, LedgerEvent, LedgerNotification, RawConfigAction, ScheduledCall,
    ScheduledConfigChange, Timestamp, TxReceipt, VaultDeployment,
};
pub use messaging::MessagingTransport;
pub use time::{PhysicalTimeEffects, SystemClock, TimeError};

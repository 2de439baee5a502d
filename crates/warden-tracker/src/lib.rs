//! Warden Tracker - Pending Operation Reconstruction
//!
//! The ledger only offers append-only event streams. The tracker queries
//! Scheduled, Applied and Cancelled events for both operation families and
//! derives the pending set as a pure fold, classifying each operation as a
//! transfer, token transfer, contract call or configuration change.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Operation model and call classification
pub mod operation;

/// Pure pending-set fold
pub mod reconstruct;

/// Ledger-backed queries
pub mod tracker;

pub use operation::{
    classify_call, decode_token_call, ConfigAction, DelayedOperation, OperationKind,
    OperationState,
};
pub use reconstruct::{reconstruct, EventSnapshot, PendingOperations};
pub use tracker::{BlockWindow, OperationTracker};

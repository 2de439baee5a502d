//! Warden Testing Infrastructure
//!
//! In-memory stand-ins for every external collaborator: a vault ledger with
//! real delay and cancellation rules, a manual clock, a recording message
//! transport, and helpers for building participants and identity tokens.
//!
//! ```toml
//! [dev-dependencies]
//! warden-testkit = { path = "../warden-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod clock;
pub mod fixtures;
pub mod identity;
pub mod ledger;
pub mod transport;

pub use clock::ManualClock;
pub use fixtures::{participant, test_address};
pub use identity::identity_token;
pub use ledger::MemoryLedger;
pub use transport::{RecordingTransport, SentMessage};

use warden_core::telemetry::init_tracing;
use warden_core::LoggingConfig;

/// Install a test subscriber honoring `RUST_LOG`; safe to call from every test
pub fn init_test_tracing() {
    let config = LoggingConfig {
        filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        json: false,
    };
    let _ = init_tracing(&config);
}

//! Identity proof interface
//!
//! Tokens are opaque to Warden. An implementation is responsible for signature,
//! audience and expiry validation; Warden only consumes the extracted claims.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Claims Warden needs from an identity proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub email: String,
    /// Caller-chosen value bound into the proof (new operator address for sign-in)
    pub nonce: Option<String>,
}

/// Turns an opaque signed token into claims
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<IdentityClaims>;
}

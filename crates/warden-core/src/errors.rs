//! Unified error system for Warden
//!
//! One error type is shared by every crate in the workspace. Variants carry a
//! human-readable message; constructor helpers keep call sites short.

use crate::effects::LedgerError;
use serde::{Deserialize, Serialize};

/// Unified error type for all Warden operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum WardenError {
    /// A local change was rejected against the replayed vault state
    #[error("Invalid change sequence: {message}")]
    InvalidChangeSequence {
        /// Why the change cannot be appended
        message: String,
    },

    /// The vault has an on-chain address; the local log is sealed
    #[error("Vault already deployed: {message}")]
    VaultAlreadyDeployed {
        /// Vault identifier or address
        message: String,
    },

    /// A ledger payload could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the malformed payload
        message: String,
    },

    /// The ledger could not be queried; the caller should retry
    #[error("Chain unavailable: {message}")]
    ChainUnavailable {
        /// Underlying transport failure
        message: String,
    },

    /// A cancellation was attempted after the operation's due time
    #[error("Operation matured: {message}")]
    OperationMatured {
        /// Operation hash and due time
        message: String,
    },

    /// Verification code did not match within the tolerance window
    #[error("Invalid verification code: {message}")]
    InvalidVerificationCode {
        /// The rejected code
        message: String,
    },

    /// The operation was already cancelled or applied on the ledger
    #[error("Duplicate cancel attempt: {message}")]
    DuplicateCancelAttempt {
        /// Operation hash
        message: String,
    },

    /// Identity proof could not be parsed
    #[error("Invalid identity proof: {message}")]
    InvalidIdentityProof {
        /// Description of the malformed token
        message: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Permission denied
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Error message describing the permission issue
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Config error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl WardenError {
    /// Create an invalid change sequence error
    pub fn invalid_change(message: impl Into<String>) -> Self {
        Self::InvalidChangeSequence {
            message: message.into(),
        }
    }

    /// Create a vault already deployed error
    pub fn already_deployed(message: impl Into<String>) -> Self {
        Self::VaultAlreadyDeployed {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a chain unavailable error
    pub fn chain_unavailable(message: impl Into<String>) -> Self {
        Self::ChainUnavailable {
            message: message.into(),
        }
    }

    /// Create an operation matured error
    pub fn matured(message: impl Into<String>) -> Self {
        Self::OperationMatured {
            message: message.into(),
        }
    }

    /// Create an invalid verification code error
    pub fn invalid_code(message: impl Into<String>) -> Self {
        Self::InvalidVerificationCode {
            message: message.into(),
        }
    }

    /// Create a duplicate cancel attempt error
    pub fn duplicate_cancel(message: impl Into<String>) -> Self {
        Self::DuplicateCancelAttempt {
            message: message.into(),
        }
    }

    /// Create an invalid identity proof error
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentityProof {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ChainUnavailable { .. })
    }
}

/// Standard Result type for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

impl From<LedgerError> for WardenError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable { reason } => Self::chain_unavailable(reason),
            LedgerError::Matured { op_hash, due_time } => {
                Self::matured(format!("{op_hash} matured at {due_time}"))
            }
            LedgerError::AlreadyFinalized { op_hash } => Self::duplicate_cancel(op_hash.to_string()),
            LedgerError::StaleState { expected, actual } => Self::invalid(format!(
                "stale state nonce: expected {expected}, ledger at {actual}"
            )),
            LedgerError::Rejected { reason } => Self::permission_denied(reason),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}

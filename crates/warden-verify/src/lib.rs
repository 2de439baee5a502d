//! Warden Verify - Out-of-Band Verification
//!
//! Recovery and new-operator flows are gated by a short numeric code sent to
//! the account's phone. Codes are derived, never stored: an HMAC over the
//! phone, the identity and a one-minute time bucket, valid for up to nine
//! buckets after issue.
//!
//! # Components
//! - [`VerificationCodeService`]: generate, send and verify codes
//! - [`PhoneNumber`]: E.164 normalization
//! - [`decode_unverified_claims`]: `{email, nonce}` from an identity token

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Identity token claims
pub mod claims;

/// Code derivation and verification
pub mod code;

/// Phone numbers
pub mod phone;

pub use claims::{decode_unverified_claims, UnverifiedClaims};
pub use code::{VerificationCodeService, CODE_LEN};
pub use phone::PhoneNumber;

//! Identity claims from compact signed tokens
//!
//! Signature checking belongs to the identity provider integration behind
//! [`IdentityVerifier`]; this module only reads the payload segment.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;
use warden_core::effects::{IdentityClaims, IdentityVerifier};
use warden_core::{Result, WardenError};

#[derive(Debug, Deserialize)]
struct Payload {
    email: Option<String>,
    nonce: Option<String>,
}

/// Read `{email, nonce}` from a `header.payload.signature` token without
/// checking the signature
pub fn decode_unverified_claims(token: &str) -> Result<IdentityClaims> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(WardenError::invalid_identity(
            "token must have three dot-separated segments",
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| WardenError::invalid_identity(format!("payload is not base64url: {e}")))?;
    let payload: Payload = serde_json::from_slice(&bytes)
        .map_err(|e| WardenError::invalid_identity(format!("payload is not JSON: {e}")))?;

    let email = payload
        .email
        .filter(|email| !email.is_empty())
        .ok_or_else(|| WardenError::invalid_identity("token has no email claim"))?;
    Ok(IdentityClaims {
        email,
        nonce: payload.nonce,
    })
}

/// [`IdentityVerifier`] that trusts the payload as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct UnverifiedClaims;

impl IdentityVerifier for UnverifiedClaims {
    fn verify(&self, token: &str) -> Result<IdentityClaims> {
        let claims = decode_unverified_claims(token)?;
        debug!(email = %claims.email, "accepted identity token without signature check");
        Ok(claims)
    }
}

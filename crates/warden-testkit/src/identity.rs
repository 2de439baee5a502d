//! Unsigned identity tokens for recovery-flow tests

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

/// Compact `header.payload.signature` token carrying `email` and `nonce` claims.
///
/// The signature segment is a fixed placeholder; nothing in Warden checks it.
pub fn identity_token(email: &str, nonce: Option<&str>) -> String {
    let header = json!({ "alg": "RS256", "typ": "JWT" });
    let mut payload = json!({ "email": email, "iss": "accounts.example.test" });
    if let Some(nonce) = nonce {
        payload["nonce"] = json!(nonce);
    }
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        URL_SAFE_NO_PAD.encode(b"unsigned"),
    )
}

//! Time-windowed verification codes
//!
//! A code is a pure function of `(seed, phone, identity, bucket)`, where the
//! bucket is wall-clock time divided into fixed windows. The last digit of a
//! code is the bucket's last digit, which lets the verifier find the issuing
//! bucket without storing anything.

use crate::phone::PhoneNumber;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use warden_core::config::VerificationSettings;
use warden_core::effects::{MessagingTransport, Timestamp};
use warden_core::{Result, WardenError};

type HmacSha256 = Hmac<Sha256>;

/// Framing bytes around the code input
const CODE_PAD: &[u8] = b"PAD";

/// Hash digits before the bucket digit
const HASH_DIGITS_MODULUS: u64 = 10_000_000;

/// Full code length: 7 hash digits + 1 bucket digit
pub const CODE_LEN: usize = 8;

/// Buckets share a last digit every ten windows
const BUCKET_CYCLE: u64 = 10;

/// Stateless code generator and verifier
#[derive(Clone)]
pub struct VerificationCodeService {
    seed: Vec<u8>,
    bucket_secs: u64,
    max_skew_buckets: u32,
}

impl fmt::Debug for VerificationCodeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationCodeService")
            .field("seed", &"<redacted>")
            .field("bucket_secs", &self.bucket_secs)
            .field("max_skew_buckets", &self.max_skew_buckets)
            .finish()
    }
}

impl VerificationCodeService {
    /// One-minute buckets, nine buckets of skew
    pub fn new(seed: impl Into<Vec<u8>>) -> Self {
        Self::from_settings(seed, &VerificationSettings::default())
    }

    pub fn from_settings(seed: impl Into<Vec<u8>>, settings: &VerificationSettings) -> Self {
        Self {
            seed: seed.into(),
            bucket_secs: settings.bucket_secs.max(1),
            max_skew_buckets: settings.max_skew_buckets.min(BUCKET_CYCLE as u32 - 1),
        }
    }

    /// Service keyed by a fresh 32-byte random seed
    pub fn random(settings: &VerificationSettings) -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_settings(seed.to_vec(), settings)
    }

    pub fn bucket_secs(&self) -> u64 {
        self.bucket_secs
    }

    pub fn time_bucket(&self, now_secs: Timestamp) -> u64 {
        now_secs / self.bucket_secs
    }

    /// Code for an explicit bucket
    pub fn code_at(&self, phone: &PhoneNumber, identity: &str, bucket: u64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.seed)
            .map_err(|e| WardenError::internal(format!("verification seed rejected: {e}")))?;
        mac.update(CODE_PAD);
        mac.update(phone.as_str().as_bytes());
        mac.update(&[0]);
        mac.update(identity.as_bytes());
        mac.update(&[0]);
        mac.update(&bucket.to_be_bytes());
        mac.update(CODE_PAD);
        let digest = mac.finalize().into_bytes();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let hash_digits = u64::from_be_bytes(head) % HASH_DIGITS_MODULUS;
        Ok(format!("{hash_digits:07}{}", bucket % BUCKET_CYCLE))
    }

    pub fn current_code(
        &self,
        phone: &PhoneNumber,
        identity: &str,
        now_secs: Timestamp,
    ) -> Result<String> {
        self.code_at(phone, identity, self.time_bucket(now_secs))
    }

    /// Most recent bucket, at or before now, ending in the code's last digit.
    ///
    /// Never searches forward in time and never further back than the
    /// configured skew.
    pub fn recover_bucket(&self, code: &str, now_secs: Timestamp) -> Result<u64> {
        let digit = parse_code(code)?;
        let now_bucket = self.time_bucket(now_secs);
        let back = (now_bucket % BUCKET_CYCLE + BUCKET_CYCLE - digit) % BUCKET_CYCLE;
        if back > u64::from(self.max_skew_buckets) {
            return Err(WardenError::invalid_code(format!(
                "{code} is outside the verification window"
            )));
        }
        now_bucket
            .checked_sub(back)
            .ok_or_else(|| WardenError::invalid_code(format!("{code} predates the clock")))
    }

    /// Accept `code` if it was issued for this phone and identity within the window
    pub fn verify(
        &self,
        code: &str,
        phone: &PhoneNumber,
        identity: &str,
        now_secs: Timestamp,
    ) -> Result<()> {
        let bucket = self.recover_bucket(code, now_secs)?;
        let expected = self.code_at(phone, identity, bucket)?;
        if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) {
            debug!(phone = %phone, bucket, "verification code accepted");
            Ok(())
        } else {
            Err(WardenError::invalid_code(code.to_string()))
        }
    }

    /// Deliver the current code, substituting it for `{code}` in `template`
    pub async fn send_code(
        &self,
        transport: &dyn MessagingTransport,
        phone: &PhoneNumber,
        identity: &str,
        template: &str,
        now_secs: Timestamp,
    ) -> Result<()> {
        let code = self.current_code(phone, identity, now_secs)?;
        transport
            .send(phone.as_str(), &template.replace("{code}", &code))
            .await?;
        info!(phone = %phone, "verification code sent");
        Ok(())
    }
}

/// Trailing bucket digit of a well-formed code
fn parse_code(code: &str) -> Result<u64> {
    if code.len() != CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WardenError::invalid_code(format!("malformed code {code:?}")));
    }
    code.bytes()
        .last()
        .map(|b| u64::from(b - b'0'))
        .ok_or_else(|| WardenError::invalid_code("empty code"))
}

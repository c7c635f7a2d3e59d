//! Time-based one-time passwords (RFC 6238, HMAC-SHA1, 30 second step, 6 digits).

use crate::errors::ApiClientError;
use data_encoding::{Encoding, BASE32_NOPAD};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const STEP_SECS: u64 = 30;
const DIGITS: u32 = 6;

/// Source of the current unix time in seconds.
pub type Clock = fn() -> u64;

/// Unpadded base32 that ignores leftover bits in the last character, as
/// authenticator apps do.
fn base32_lenient() -> Result<Encoding, ApiClientError> {
    let mut spec = BASE32_NOPAD.specification();
    spec.check_trailing_bits = false;
    spec.encoding().map_err(|e| ApiClientError::InvalidOtpSecret(e.to_string()))
}

fn system_clock() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Generator for the codes the API expects in the login payload and the
/// `OTP` header.
#[derive(Clone)]
pub struct Totp {
    mac: HmacSha1,
    clock: Clock,
}

impl std::fmt::Debug for Totp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Totp").finish_non_exhaustive()
    }
}

impl Totp {
    /// Decodes a base32 shared secret. Case, padding and whitespace are ignored.
    pub fn from_base32(secret: &str) -> Result<Self, ApiClientError> {
        let normalized: String = secret
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if normalized.is_empty() {
            return Err(ApiClientError::InvalidOtpSecret("empty secret".to_string()));
        }
        let key = base32_lenient()?
            .decode(normalized.as_bytes())
            .map_err(|e| ApiClientError::InvalidOtpSecret(e.to_string()))?;
        Self::from_key(&key)
    }

    pub fn from_key(key: &[u8]) -> Result<Self, ApiClientError> {
        let mac = HmacSha1::new_from_slice(key)
            .map_err(|e| ApiClientError::InvalidOtpSecret(e.to_string()))?;
        Ok(Self {
            mac,
            clock: system_clock,
        })
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The code for the current time step.
    pub fn now(&self) -> String {
        self.at((self.clock)())
    }

    /// The code for the step containing `unix_secs`.
    pub fn at(&self, unix_secs: u64) -> String {
        let counter = unix_secs / STEP_SECS;
        let mut mac = self.mac.clone();
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = (u32::from(digest[offset]) & 0x7f) << 24
            | u32::from(digest[offset + 1]) << 16
            | u32::from(digest[offset + 2]) << 8
            | u32::from(digest[offset + 3]);
        let code = binary % 10u32.pow(DIGITS);
        format!("{code:0width$}", width = DIGITS as usize)
    }
}

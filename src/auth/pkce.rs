//! PKCE verifier/challenge pair (RFC 7636, S256 only).
//!
//! The verifier is the proof that the token-exchange request comes from the
//! same process that opened the authorization request. It must never be
//! logged or written to disk; only its S256 digest travels in the
//! authorization URL. The `plain` challenge method is never produced or
//! accepted here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::error::AuthError;

/// RFC 7636 bounds for the verifier length.
const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;
/// Random bytes drawn per verifier; 32 bytes base64url-encode to exactly
/// the 43-character minimum.
const VERIFIER_RANDOM_BYTES: usize = 32;

/// High-entropy PKCE code verifier.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeVerifier(String);

impl CodeVerifier {
    /// Generate a fresh verifier from the system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Validate and wrap an externally supplied verifier.
    ///
    /// Enforces the RFC 7636 length window (43-128) and the unreserved
    /// character set `[A-Za-z0-9-._~]`.
    pub fn parse(value: String) -> Result<Self, AuthError> {
        let len = value.len();
        if !(VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&len) {
            return Err(AuthError::Invalid(format!(
                "code verifier must be {VERIFIER_MIN_LEN}-{VERIFIER_MAX_LEN} characters, got {len}"
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(AuthError::Invalid(
                "code verifier contains characters outside [A-Za-z0-9-._~]".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the S256 code challenge: `base64url(sha256(ascii(verifier)))`.
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

// Keep the verifier out of debug output and logs.
impl std::fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CodeVerifier(..)")
    }
}

/// Challenge method name sent alongside the challenge. Fixed: downgrading to
/// `plain` would defeat the point of PKCE on a public client.
pub const CHALLENGE_METHOD: &str = "S256";

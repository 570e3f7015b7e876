//! Public auth model types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::pkce::CodeVerifier;

/// Seconds before the stated expiry at which a token is already treated as
/// expired. Covers backend clock skew and tokens that would die mid-request.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Tokens held for one signed-in environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Unix timestamp at which the access token expires.
    pub expires_at_unix: i64,
}

impl TokenSet {
    /// True when the access token should no longer be used.
    ///
    /// Deliberately conservative: the token counts as expired a full
    /// [`EXPIRY_BUFFER_SECS`] before its stated expiry, boundary inclusive.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now_secs(), EXPIRY_BUFFER_SECS)
    }

    /// Expiry check against an explicit clock and buffer, for callers and
    /// tests that control time.
    pub fn is_expired_at(&self, now_unix: i64, buffer_secs: i64) -> bool {
        now_unix >= self.expires_at_unix.saturating_sub(buffer_secs)
    }

    /// True when this session can be extended without re-prompting the user.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Secrets and bindings of one outstanding authorization request.
///
/// Created when a flow starts, held only in process memory, and destroyed
/// the moment the flow reaches a terminal outcome. Single-use by contract:
/// the flow layer never lets one of these span two exchange attempts.
#[derive(Debug)]
pub struct PendingAuthorization {
    /// CSRF binding echoed back on the callback.
    pub state: String,
    /// Replay binding echoed inside the ID token.
    pub nonce: String,
    /// PKCE secret proving possession at the token exchange.
    pub verifier: CodeVerifier,
    /// Optional post-login destination requested by the caller.
    pub return_to: Option<String>,
}

/// Health summary for a stored session, for `mercato status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHealth {
    pub environment: String,
    pub has_tokens: bool,
    pub expired: bool,
    pub can_refresh: bool,
    pub expires_at_unix: Option<i64>,
}

pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

//! Auth subsystem error definitions.

use std::fmt;

/// Errors surfaced by the sign-in/session subsystem.
///
/// Nothing here is retried automatically: authorization codes are single-use,
/// so the correct recovery for any variant except `Cancelled` is to restart
/// the whole flow.
#[derive(Debug)]
pub enum AuthError {
    Io(std::io::Error),
    Http(reqwest::Error),
    /// Non-2xx response outside the structured OAuth error paths.
    Status(u16, String),
    Invalid(String),
    /// The user closed or dismissed the browser step. Expected, not fatal.
    Cancelled,
    /// Error reported by the identity provider on the callback
    /// (e.g. `access_denied`), surfaced verbatim.
    Provider {
        code: String,
        description: Option<String>,
    },
    /// Callback `state` did not match the pending request. Always aborts.
    CsrfMismatch,
    /// Malformed callback (missing `code`, unparseable URL, bad JWT shape).
    Protocol(String),
    /// Token endpoint rejected the authorization-code exchange.
    ExchangeFailed {
        status: u16,
        code: Option<String>,
        description: Option<String>,
    },
    /// Refresh token was rejected; the session is gone and the user must
    /// sign in again.
    RefreshExpired,
    /// A login flow is already outstanding; only one may be in flight.
    LoginInProgress,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Http(err) => write!(f, "http: {err}"),
            Self::Status(code, body) => write!(f, "status {code}: {body}"),
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::Cancelled => write!(f, "sign-in was cancelled"),
            Self::Provider { code, description } => match description {
                Some(detail) => write!(f, "provider error {code}: {detail}"),
                None => write!(f, "provider error {code}"),
            },
            Self::CsrfMismatch => {
                write!(f, "callback state did not match the pending sign-in request")
            }
            Self::Protocol(msg) => write!(f, "malformed callback: {msg}"),
            Self::ExchangeFailed {
                status,
                code,
                description,
            } => {
                write!(f, "token exchange failed (status {status})")?;
                if let Some(code) = code {
                    write!(f, ": {code}")?;
                }
                if let Some(detail) = description {
                    write!(f, " - {detail}")?;
                }
                Ok(())
            }
            Self::RefreshExpired => {
                write!(
                    f,
                    "saved session has expired or was revoked; run `mercato login` again"
                )
            }
            Self::LoginInProgress => {
                write!(f, "a sign-in flow is already in progress")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<std::io::Error> for AuthError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

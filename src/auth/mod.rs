//! OIDC sign-in and session management.
//!
//! This module implements the Authorization Code + PKCE flow against the
//! platform's Keycloak-compatible identity provider, plus encrypted local
//! persistence of the resulting session. The flow is strictly single-flight:
//! one pending authorization at a time, and its secrets die with the attempt.

mod browser;
mod claims;
mod crypto;
mod error;
mod flow;
mod pkce;
mod provider;
mod request;
mod session;
mod store;
mod token;
mod types;

pub use browser::{try_open_browser, BrowserOutcome, SystemBrowser, UserAgent};
pub use claims::{decode_unverified, Audience, RealmAccess, UnverifiedClaims};
pub use error::AuthError;
pub use flow::AuthClient;
pub use pkce::{CodeVerifier, CHALLENGE_METHOD};
pub use provider::IssuerEndpoints;
pub use request::{AuthorizationRequest, AuthorizeOptions};
pub use session::{fresh_access_token, persist_login, sign_out};
pub use store::{
    clear_environment_tokens, default_session_store_path, load_environment_tokens,
    save_environment_tokens, session_health,
};
pub use types::{SessionHealth, TokenSet, EXPIRY_BUFFER_SECS};

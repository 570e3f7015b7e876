//! Session lifecycle on top of the store: keep an access token fresh,
//! persist login results, tear sessions down.

use std::path::Path;

use super::browser::try_open_browser;
use super::error::AuthError;
use super::flow::AuthClient;
use super::store;
use super::types::TokenSet;

/// Persist a successful login for an environment.
pub fn persist_login(
    store_path: &Path,
    environment: &str,
    tokens: TokenSet,
) -> Result<(), AuthError> {
    store::save_environment_tokens_at(store_path, environment, tokens)
}

/// Return a usable access token for the environment, refreshing through the
/// IdP when the stored one is near expiry.
///
/// Refresh failure is not papered over: a dead refresh token surfaces as
/// [`AuthError::RefreshExpired`] so the caller can send the user back to a
/// full interactive login instead of silently degrading.
pub async fn fresh_access_token(
    client: &AuthClient,
    store_path: &Path,
    environment: &str,
) -> Result<TokenSet, AuthError> {
    let Some(tokens) = store::load_environment_tokens_at(store_path, environment)? else {
        return Err(AuthError::Invalid(format!(
            "no saved session for environment `{environment}`; run `mercato login` first"
        )));
    };

    if !tokens.is_expired() {
        return Ok(tokens);
    }

    let Some(refresh_token) = tokens.refresh_token.as_deref() else {
        return Err(AuthError::RefreshExpired);
    };

    tracing::debug!(environment, "access token near expiry; refreshing");
    let refreshed = client.refresh(refresh_token).await?;
    store::save_environment_tokens_at(store_path, environment, refreshed.clone())?;
    Ok(refreshed)
}

/// End the session locally and at the IdP.
///
/// Revocation and the end-session redirect are both best-effort: their
/// failures are logged and the local session is cleared regardless, since
/// the user's intent is to be signed out.
///
/// Returns `true` when a saved session existed.
pub async fn sign_out(
    client: &AuthClient,
    store_path: &Path,
    environment: &str,
    open_end_session: bool,
) -> Result<bool, AuthError> {
    let Some(tokens) = store::load_environment_tokens_at(store_path, environment)? else {
        return Ok(false);
    };

    if let Some(refresh_token) = tokens.refresh_token.as_deref() {
        // Best-effort; a failure is logged inside and never blocks logout.
        let _ = client.revoke_refresh_token(refresh_token).await;
    }

    if open_end_session {
        match client.end_session_url(tokens.id_token.as_deref()) {
            Ok(url) => {
                if !try_open_browser(&url) {
                    tracing::warn!("could not open the end-session page; IdP cookie may survive");
                }
            }
            Err(err) => tracing::warn!(%err, "could not build the end-session URL"),
        }
    }

    store::clear_environment_tokens_at(store_path, environment)?;
    Ok(true)
}

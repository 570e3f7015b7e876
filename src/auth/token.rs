//! Back-channel requests to the identity provider: code exchange, refresh,
//! revocation, and userinfo.

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

use super::error::AuthError;
use super::pkce::CodeVerifier;
use super::provider::IssuerEndpoints;
use super::types::{unix_now_secs, TokenSet};

/// Shared HTTP timeout for IdP requests.
const IDP_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Floor applied to provider-reported lifetimes so a clock hiccup cannot
/// produce an already-expired session.
const MIN_TOKEN_LIFETIME_SECS: i64 = 60;
/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    scope: Option<String>,
    expires_in: Option<i64>,
}

/// Structured OAuth error body (`{"error": ..., "error_description": ...}`).
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorBody {
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

/// Lazily initialized shared HTTP client for IdP requests.
pub(crate) fn shared_idp_http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(IDP_HTTP_TIMEOUT)
            .user_agent(concat!("mercato/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Redeem an authorization code, proving possession of the PKCE verifier.
///
/// A failure here is terminal for the login attempt: codes are single-use,
/// so the caller restarts the flow instead of retrying.
pub(crate) async fn exchange_authorization_code(
    client: &reqwest::Client,
    endpoints: &IssuerEndpoints,
    client_id: &str,
    redirect_uri: &str,
    code: &str,
    verifier: &CodeVerifier,
) -> Result<TokenSet, AuthError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", verifier.as_str()),
    ];

    let response = client
        .post(&endpoints.token)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(exchange_error(status, &body));
    }

    let payload: TokenEndpointResponse = response.json().await?;
    token_set_from_response(payload, None)
}

/// Extend a session with the refresh-token grant.
///
/// A 400/401 means the refresh token is dead (revoked, rotated away, or
/// past its own lifetime): the caller must run a fresh interactive login.
/// This function never falls back silently.
pub(crate) async fn refresh_tokens(
    client: &reqwest::Client,
    endpoints: &IssuerEndpoints,
    client_id: &str,
    refresh_token: &str,
) -> Result<TokenSet, AuthError> {
    let form = [
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("refresh_token", refresh_token),
    ];

    let response = client
        .post(&endpoints.token)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await?;

    let status = response.status().as_u16();
    if status == 400 || status == 401 {
        return Err(AuthError::RefreshExpired);
    }
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Status(status, body));
    }

    let payload: TokenEndpointResponse = response.json().await?;
    // Keycloak rotates refresh tokens; keep the old one on partial responses.
    token_set_from_response(payload, Some(refresh_token))
}

/// Revoke a refresh token. Best-effort by design: the caller is tearing the
/// session down either way, so failures are reported, not raised.
pub(crate) async fn revoke_refresh_token(
    client: &reqwest::Client,
    endpoints: &IssuerEndpoints,
    client_id: &str,
    refresh_token: &str,
) -> Result<(), AuthError> {
    let form = [
        ("client_id", client_id),
        ("token", refresh_token),
        ("token_type_hint", "refresh_token"),
    ];

    let response = client
        .post(&endpoints.revocation)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Status(status, body));
    }
    Ok(())
}

/// Fetch the server-verified identity for `mercato whoami`.
pub(crate) async fn fetch_userinfo(
    client: &reqwest::Client,
    endpoints: &IssuerEndpoints,
    access_token: &str,
) -> Result<serde_json::Value, AuthError> {
    let response = client
        .get(&endpoints.userinfo)
        .bearer_auth(access_token)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Status(status, body));
    }
    Ok(response.json().await?)
}

/// Map a non-2xx exchange response to `ExchangeFailed`, preferring the
/// structured OAuth error body when one parses.
fn exchange_error(status: u16, body: &str) -> AuthError {
    let parsed: Option<OAuthErrorBody> = serde_json::from_str(body).ok();
    match parsed {
        Some(OAuthErrorBody {
            error,
            error_description,
        }) => AuthError::ExchangeFailed {
            status,
            code: error,
            description: error_description,
        },
        None => AuthError::ExchangeFailed {
            status,
            code: None,
            description: None,
        },
    }
}

/// Validate the wire response and pin an absolute expiry to it.
fn token_set_from_response(
    payload: TokenEndpointResponse,
    refresh_fallback: Option<&str>,
) -> Result<TokenSet, AuthError> {
    let access_token = payload.access_token.unwrap_or_default().trim().to_string();
    if access_token.is_empty() {
        return Err(AuthError::Invalid(
            "token response did not include access_token".to_string(),
        ));
    }

    let refresh_token = payload
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| refresh_fallback.map(str::to_string));

    let expires_in = payload
        .expires_in
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
        .max(MIN_TOKEN_LIFETIME_SECS);

    Ok(TokenSet {
        access_token,
        refresh_token,
        id_token: payload.id_token,
        scope: payload.scope,
        expires_at_unix: unix_now_secs().saturating_add(expires_in),
    })
}

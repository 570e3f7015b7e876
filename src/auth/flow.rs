//! Sign-in flow orchestration and callback validation.
//!
//! `AuthClient` owns the single pending-authorization slot: at most one
//! login attempt may be outstanding, and its CSRF/PKCE secrets never leak
//! into a concurrent or later flow. Every terminal outcome (success, cancel,
//! validation failure, exchange failure) empties the slot before control
//! returns to the caller, so a stale callback can never be replayed.

use reqwest::Url;
use std::sync::{Mutex, PoisonError};
use subtle::ConstantTimeEq;

use super::browser::{BrowserOutcome, UserAgent};
use super::claims;
use super::error::AuthError;
use super::pkce::CodeVerifier;
use super::provider::IssuerEndpoints;
use super::request::{
    build_authorize_url, random_request_token, AuthorizationRequest, AuthorizeOptions,
};
use super::token;
use super::types::{PendingAuthorization, TokenSet};

/// OIDC client for one configured environment.
pub struct AuthClient {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    endpoints: IssuerEndpoints,
    http: reqwest::Client,
    pending: Mutex<Option<PendingAuthorization>>,
}

impl AuthClient {
    /// Build a client for an issuer/client-id pair.
    pub fn new(
        issuer: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes,
            endpoints: IssuerEndpoints::for_issuer(issuer),
            http: token::shared_idp_http_client().clone(),
            pending: Mutex::new(None),
        }
    }

    /// Override the HTTP client (tests point this at a local mock IdP).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn endpoints(&self) -> &IssuerEndpoints {
        &self.endpoints
    }

    /// Start a login attempt: generate the PKCE pair plus `state`/`nonce`,
    /// build the authorization URL, and park the secrets in the pending slot.
    ///
    /// Fails with [`AuthError::LoginInProgress`] while another attempt is
    /// outstanding; the single-flight invariant is part of the contract, not
    /// an accident of global state.
    pub fn begin_authorization(
        &self,
        options: &AuthorizeOptions,
    ) -> Result<AuthorizationRequest, AuthError> {
        let mut slot = self.lock_pending();
        if slot.is_some() {
            return Err(AuthError::LoginInProgress);
        }

        let verifier = CodeVerifier::generate();
        let state = random_request_token();
        let nonce = random_request_token();
        let url = build_authorize_url(
            &self.endpoints,
            &self.client_id,
            &self.redirect_uri,
            &self.scopes,
            &state,
            &nonce,
            &verifier,
            options,
        )?;

        *slot = Some(PendingAuthorization {
            state: state.clone(),
            nonce,
            verifier,
            return_to: options.return_to.clone(),
        });
        tracing::debug!(client_id = %self.client_id, "authorization request built");

        Ok(AuthorizationRequest { url, state })
    }

    /// Abort the outstanding attempt, if any. Used when the browser step is
    /// cancelled or dismissed.
    pub fn cancel_pending(&self) {
        self.lock_pending().take();
    }

    /// True while a login attempt is outstanding.
    pub fn has_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Post-login destination recorded when the outstanding flow started.
    /// Callers route there after a successful exchange.
    pub fn pending_return_to(&self) -> Option<String> {
        self.lock_pending()
            .as_ref()
            .and_then(|pending| pending.return_to.clone())
    }

    /// Validate a callback URL against the pending request and extract the
    /// authorization code.
    ///
    /// Every rejection empties the pending slot; the secrets of a failed
    /// attempt are unusable afterwards. On success the slot is kept — the
    /// verifier is still needed for [`Self::exchange_code`].
    pub fn handle_callback(&self, redirect_url: &str) -> Result<String, AuthError> {
        let parsed = Url::parse(redirect_url).map_err(|err| {
            self.cancel_pending();
            AuthError::Protocol(format!("unparseable callback URL: {err}"))
        })?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        // Provider-reported failure (e.g. access_denied): surface verbatim
        // and never attempt the exchange.
        if let Some(error_code) = error {
            self.cancel_pending();
            tracing::debug!(error = %error_code, "provider rejected the authorization request");
            return Err(AuthError::Provider {
                code: error_code,
                description: error_description,
            });
        }

        let mut slot = self.lock_pending();
        let Some(pending) = slot.as_ref() else {
            // No outstanding attempt: either a stale redirect from an earlier
            // flow or an injected callback. Reject outright.
            return Err(AuthError::CsrfMismatch);
        };

        let presented = state.unwrap_or_default();
        let state_matches: bool = presented
            .as_bytes()
            .ct_eq(pending.state.as_bytes())
            .into();
        if !state_matches {
            slot.take();
            tracing::warn!("callback state mismatch; aborting sign-in attempt");
            return Err(AuthError::CsrfMismatch);
        }

        match code {
            Some(code) if !code.is_empty() => Ok(code),
            _ => {
                slot.take();
                Err(AuthError::Protocol(
                    "callback carried no authorization code".to_string(),
                ))
            }
        }
    }

    /// Redeem a validated authorization code for tokens.
    ///
    /// The pending slot is emptied when the exchange completes — success or
    /// failure — so one state object can never span two exchange attempts,
    /// and a new flow cannot start while the exchange is still in flight.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AuthError> {
        let (verifier, nonce) = {
            let slot = self.lock_pending();
            match slot.as_ref() {
                Some(pending) => (pending.verifier.clone(), pending.nonce.clone()),
                None => {
                    return Err(AuthError::Protocol(
                        "no pending authorization for this exchange".to_string(),
                    ))
                }
            }
        };

        let result = token::exchange_authorization_code(
            &self.http,
            &self.endpoints,
            &self.client_id,
            &self.redirect_uri,
            code,
            &verifier,
        )
        .await
        .and_then(|tokens| {
            check_id_token_nonce(&tokens, &nonce)?;
            Ok(tokens)
        });

        self.cancel_pending();
        match &result {
            Ok(_) => tracing::debug!("authorization code exchanged"),
            Err(err) => tracing::debug!(%err, "token exchange failed"),
        }
        result
    }

    /// Run the whole interactive flow: build the request, hand it to the
    /// user agent, validate the callback, and exchange the code.
    pub async fn login(
        &self,
        agent: &dyn UserAgent,
        options: &AuthorizeOptions,
    ) -> Result<TokenSet, AuthError> {
        let request = self.begin_authorization(options)?;

        let outcome = match agent.open(&request.url, &self.redirect_uri).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.cancel_pending();
                return Err(err);
            }
        };

        match outcome {
            BrowserOutcome::Redirect(url) => {
                let code = self.handle_callback(&url)?;
                self.exchange_code(&code).await
            }
            BrowserOutcome::Cancelled | BrowserOutcome::Dismissed => {
                // Expected user decision; never retried automatically.
                self.cancel_pending();
                Err(AuthError::Cancelled)
            }
        }
    }

    /// Extend the session with the refresh-token grant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        token::refresh_tokens(&self.http, &self.endpoints, &self.client_id, refresh_token).await
    }

    /// Revoke a refresh token, best-effort. A failed revocation must not
    /// block logout, so it is reported in the return value and logged, never
    /// raised.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> bool {
        match token::revoke_refresh_token(
            &self.http,
            &self.endpoints,
            &self.client_id,
            refresh_token,
        )
        .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "refresh token revocation failed; continuing logout");
                false
            }
        }
    }

    /// Server-verified identity of the current session.
    pub async fn userinfo(&self, access_token: &str) -> Result<serde_json::Value, AuthError> {
        token::fetch_userinfo(&self.http, &self.endpoints, access_token).await
    }

    /// Front-channel end-session URL terminating the IdP's own cookie.
    pub fn end_session_url(&self, id_token_hint: Option<&str>) -> Result<String, AuthError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", &self.client_id),
            ("post_logout_redirect_uri", &self.redirect_uri),
        ];
        if let Some(hint) = id_token_hint {
            params.push(("id_token_hint", hint));
        }
        let url = Url::parse_with_params(&self.endpoints.end_session, &params).map_err(|err| {
            AuthError::Invalid(format!(
                "invalid end-session endpoint `{}`: {err}",
                self.endpoints.end_session
            ))
        })?;
        Ok(url.into())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<PendingAuthorization>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// When the exchange returned an ID token, its `nonce` claim must echo the
/// one bound to this attempt. Structural check only; signature verification
/// stays with the backend.
fn check_id_token_nonce(tokens: &TokenSet, expected_nonce: &str) -> Result<(), AuthError> {
    let Some(id_token) = tokens.id_token.as_deref() else {
        return Ok(());
    };
    let claims = claims::decode_unverified(id_token)?;
    match claims.nonce.as_deref() {
        None => Ok(()),
        Some(nonce) if nonce == expected_nonce => Ok(()),
        Some(_) => Err(AuthError::Protocol(
            "ID token nonce does not match the pending request".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AuthClient {
        AuthClient::new(
            "https://id.example/realms/acme",
            "mercato-cli",
            "http://127.0.0.1:8732/callback",
            vec!["openid".into(), "offline_access".into()],
        )
    }

    fn begin(client: &AuthClient) -> AuthorizationRequest {
        client
            .begin_authorization(&AuthorizeOptions::default())
            .expect("begin")
    }

    #[test]
    fn begin_parks_pending_state() {
        let client = client();
        assert!(!client.has_pending());
        let request = begin(&client);
        assert!(client.has_pending());
        assert!(request.url.contains("response_type=code"));
    }

    #[test]
    fn return_to_is_recorded_with_the_pending_flow() {
        let client = client();
        client
            .begin_authorization(&AuthorizeOptions {
                return_to: Some("/orders/backlog".into()),
                ..AuthorizeOptions::default()
            })
            .expect("begin");
        assert_eq!(client.pending_return_to().as_deref(), Some("/orders/backlog"));
        client.cancel_pending();
        assert_eq!(client.pending_return_to(), None);
    }

    // Verifies the redesigned single-flight contract: a second begin while
    // one attempt is outstanding is an explicit error.
    #[test]
    fn second_begin_fails_while_pending() {
        let client = client();
        let _first = begin(&client);
        let err = client
            .begin_authorization(&AuthorizeOptions::default())
            .expect_err("second flow must be rejected");
        assert!(matches!(err, AuthError::LoginInProgress));
        // The original attempt is still valid.
        assert!(client.has_pending());
    }

    #[test]
    fn matching_state_yields_the_code() {
        let client = client();
        let request = begin(&client);
        let code = client
            .handle_callback(&format!(
                "http://127.0.0.1:8732/callback?code=abc&state={}",
                request.state
            ))
            .expect("valid callback");
        assert_eq!(code, "abc");
        // Slot survives for the exchange step.
        assert!(client.has_pending());
    }

    // Verifies a tampered state is always rejected even with a well-formed
    // code, and that rejection burns the pending attempt.
    #[test]
    fn tampered_state_is_rejected_and_clears_pending() {
        let client = client();
        let request = begin(&client);
        let tampered = format!("{}x", request.state);
        let err = client
            .handle_callback(&format!(
                "http://127.0.0.1:8732/callback?code=abc&state={tampered}"
            ))
            .expect_err("tampered state");
        assert!(matches!(err, AuthError::CsrfMismatch));
        assert!(!client.has_pending());
    }

    #[test]
    fn callback_without_pending_flow_is_rejected() {
        let client = client();
        let err = client
            .handle_callback("http://127.0.0.1:8732/callback?code=abc&state=stale")
            .expect_err("no pending flow");
        assert!(matches!(err, AuthError::CsrfMismatch));
    }

    // Verifies access_denied short-circuits before any token traffic and
    // surfaces the provider's wording verbatim.
    #[test]
    fn provider_error_short_circuits() {
        let client = client();
        let _request = begin(&client);
        let err = client
            .handle_callback(
                "http://127.0.0.1:8732/callback?error=access_denied&error_description=User%20denied",
            )
            .expect_err("provider error");
        match err {
            AuthError::Provider { code, description } => {
                assert_eq!(code, "access_denied");
                assert_eq!(description.as_deref(), Some("User denied"));
            }
            other => panic!("expected Provider error, got: {other}"),
        }
        assert!(!client.has_pending());
    }

    #[test]
    fn callback_without_code_is_a_protocol_error() {
        let client = client();
        let request = begin(&client);
        let err = client
            .handle_callback(&format!(
                "http://127.0.0.1:8732/callback?state={}",
                request.state
            ))
            .expect_err("missing code");
        assert!(matches!(err, AuthError::Protocol(_)));
        assert!(!client.has_pending());
    }

    #[test]
    fn cancel_clears_pending() {
        let client = client();
        let _request = begin(&client);
        client.cancel_pending();
        assert!(!client.has_pending());
        // A stale callback after cancellation is rejected as "no pending".
        let err = client
            .handle_callback("http://127.0.0.1:8732/callback?code=abc&state=old")
            .expect_err("stale callback");
        assert!(matches!(err, AuthError::CsrfMismatch));
    }

    #[test]
    fn exchange_without_pending_is_rejected() {
        let client = client();
        let err = futures_block_on(client.exchange_code("abc")).expect_err("no pending");
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[test]
    fn end_session_url_carries_client_and_redirect() {
        let client = client();
        let url = client.end_session_url(Some("idtok")).expect("url");
        assert!(url.starts_with(
            "https://id.example/realms/acme/protocol/openid-connect/logout?"
        ));
        assert!(url.contains("client_id=mercato-cli"));
        assert!(url.contains("post_logout_redirect_uri="));
        assert!(url.contains("id_token_hint=idtok"));
    }

    #[test]
    fn nonce_check_accepts_matching_and_absent_nonce() {
        let tokens_without = TokenSet {
            access_token: "at".into(),
            refresh_token: None,
            id_token: None,
            scope: None,
            expires_at_unix: 0,
        };
        assert!(check_id_token_nonce(&tokens_without, "n-1").is_ok());

        let tokens_with = TokenSet {
            id_token: Some(crate::testsupport::unsigned_jwt(
                &serde_json::json!({"nonce": "n-1"}),
            )),
            ..tokens_without.clone()
        };
        assert!(check_id_token_nonce(&tokens_with, "n-1").is_ok());
        assert!(matches!(
            check_id_token_nonce(&tokens_with, "n-2"),
            Err(AuthError::Protocol(_))
        ));
    }

    /// Tiny current-thread executor so sync tests can drive one future.
    fn futures_block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("test runtime")
            .block_on(future)
    }
}

//! Authorization request construction.
//!
//! Builds the front-channel URL the browser is sent to, plus the per-request
//! secrets (`state`, `nonce`) that bind the eventual callback and ID token
//! back to this process.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;

use super::error::AuthError;
use super::pkce::{CodeVerifier, CHALLENGE_METHOD};
use super::provider::IssuerEndpoints;

/// Random bytes per `state`/`nonce` value. Both must be unpredictable and
/// unique per request; they are generated independently of each other and of
/// the PKCE verifier.
const REQUEST_TOKEN_BYTES: usize = 32;

/// Caller-tunable knobs for one authorization request.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// OIDC `prompt` parameter (e.g. `login` to force re-authentication).
    pub prompt: Option<String>,
    /// Pre-filled username hint.
    pub login_hint: Option<String>,
    /// Preferred UI locales for the IdP login page.
    pub ui_locales: Option<String>,
    /// Post-login destination remembered across the flow.
    pub return_to: Option<String>,
}

/// A fully built authorization request, ready to hand to the user agent.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Complete authorization endpoint URL including all query parameters.
    pub url: String,
    /// CSRF binding; the callback must echo this exactly.
    pub state: String,
}

/// Generate one opaque request token (`state` or `nonce`).
pub(crate) fn random_request_token() -> String {
    let mut bytes = [0u8; REQUEST_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Assemble the authorization URL for the code + PKCE flow.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_authorize_url(
    endpoints: &IssuerEndpoints,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    nonce: &str,
    verifier: &CodeVerifier,
    options: &AuthorizeOptions,
) -> Result<String, AuthError> {
    let scope = scopes.join(" ");
    let challenge = verifier.challenge();

    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", client_id),
        ("response_type", "code"),
        ("redirect_uri", redirect_uri),
        ("scope", &scope),
        ("state", state),
        ("nonce", nonce),
        ("code_challenge", &challenge),
        ("code_challenge_method", CHALLENGE_METHOD),
    ];
    if let Some(prompt) = options.prompt.as_deref() {
        params.push(("prompt", prompt));
    }
    if let Some(hint) = options.login_hint.as_deref() {
        params.push(("login_hint", hint));
    }
    if let Some(locales) = options.ui_locales.as_deref() {
        params.push(("ui_locales", locales));
    }

    let url = Url::parse_with_params(&endpoints.authorization, &params).map_err(|err| {
        AuthError::Invalid(format!(
            "invalid authorization endpoint `{}`: {err}",
            endpoints.authorization
        ))
    })?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> IssuerEndpoints {
        IssuerEndpoints::for_issuer("https://id.example/realms/acme")
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        let parsed = Url::parse(url).expect("built URL parses");
        parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn authorize_url_carries_required_parameters() {
        let verifier = CodeVerifier::generate();
        let url = build_authorize_url(
            &endpoints(),
            "mercato-cli",
            "http://127.0.0.1:8732/callback",
            &["openid".into(), "offline_access".into()],
            "state-1",
            "nonce-1",
            &verifier,
            &AuthorizeOptions::default(),
        )
        .expect("build");

        assert!(url.starts_with("https://id.example/realms/acme/protocol/openid-connect/auth?"));
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("mercato-cli"));
        assert_eq!(query_value(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(
            query_value(&url, "scope").as_deref(),
            Some("openid offline_access")
        );
        assert_eq!(query_value(&url, "state").as_deref(), Some("state-1"));
        assert_eq!(query_value(&url, "nonce").as_deref(), Some("nonce-1"));
        assert_eq!(
            query_value(&url, "code_challenge").as_deref(),
            Some(verifier.challenge().as_str())
        );
        assert_eq!(
            query_value(&url, "code_challenge_method").as_deref(),
            Some("S256")
        );
        // Optional parameters stay absent unless requested.
        assert_eq!(query_value(&url, "prompt"), None);
        assert_eq!(query_value(&url, "login_hint"), None);
    }

    #[test]
    fn authorize_url_includes_optional_parameters_when_set() {
        let url = build_authorize_url(
            &endpoints(),
            "mercato-cli",
            "http://127.0.0.1:8732/callback",
            &["openid".into()],
            "s",
            "n",
            &CodeVerifier::generate(),
            &AuthorizeOptions {
                prompt: Some("login".into()),
                login_hint: Some("ops@acme.example".into()),
                ui_locales: Some("it en".into()),
                return_to: None,
            },
        )
        .expect("build");

        assert_eq!(query_value(&url, "prompt").as_deref(), Some("login"));
        assert_eq!(
            query_value(&url, "login_hint").as_deref(),
            Some("ops@acme.example")
        );
        assert_eq!(query_value(&url, "ui_locales").as_deref(), Some("it en"));
    }

    // Verifies the verifier itself never leaks into the front-channel URL.
    #[test]
    fn authorize_url_never_contains_the_verifier() {
        let verifier = CodeVerifier::generate();
        let url = build_authorize_url(
            &endpoints(),
            "mercato-cli",
            "http://127.0.0.1:8732/callback",
            &["openid".into()],
            "s",
            "n",
            &verifier,
            &AuthorizeOptions::default(),
        )
        .expect("build");
        assert!(!url.contains(verifier.as_str()));
    }

    #[test]
    fn request_tokens_are_unique_and_url_safe() {
        let a = random_request_token();
        let b = random_request_token();
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}

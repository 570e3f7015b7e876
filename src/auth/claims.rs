//! Unverified JWT claim reading for UI display.
//!
//! The client decodes token payloads without checking the signature; real
//! verification belongs to the resource servers. The type is named
//! `UnverifiedClaims` so nothing downstream can mistake it for an
//! authenticated identity and use it to gate anything that matters.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;

use super::error::AuthError;

/// Claims decoded from a token payload without signature verification.
///
/// Display-only: tenant name in the prompt, role badges, expiry countdowns.
/// Never an input to an authorization decision.
#[derive(Debug, Clone, Deserialize)]
pub struct UnverifiedClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Mercato platform claim: the tenant this staff account belongs to.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    /// Keycloak realm roles.
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

impl UnverifiedClaims {
    /// Realm role names, empty when the claim is absent.
    pub fn roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|access| access.roles.as_slice())
            .unwrap_or_default()
    }
}

/// Keycloak `realm_access` claim payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The `aud` claim may be a single string or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(aud) => aud == value,
            Self::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::Protocol(
            "token is not a three-segment JWT".to_string(),
        ));
    };

    // Providers should emit unpadded base64url, but tolerate padded output.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .map_err(|err| AuthError::Protocol(format!("undecodable JWT payload: {err}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::Protocol(format!("unparseable JWT claims: {err}")))
}

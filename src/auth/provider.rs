//! Identity-provider endpoint layout.
//!
//! The platform IdP is Keycloak-compatible, so every endpoint hangs off the
//! issuer at a fixed path under `protocol/openid-connect/`. No discovery
//! round-trip is needed; the issuer URL in config is the single source.

/// Resolved endpoint URLs for one issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerEndpoints {
    pub authorization: String,
    pub token: String,
    pub revocation: String,
    pub end_session: String,
    pub userinfo: String,
}

impl IssuerEndpoints {
    /// Derive the Keycloak endpoint set from an issuer URL such as
    /// `https://id.mercato.example/realms/acme`.
    pub fn for_issuer(issuer: &str) -> Self {
        let base = issuer.trim().trim_end_matches('/');
        Self {
            authorization: format!("{base}/protocol/openid-connect/auth"),
            token: format!("{base}/protocol/openid-connect/token"),
            revocation: format!("{base}/protocol/openid-connect/revoke"),
            end_session: format!("{base}/protocol/openid-connect/logout"),
            userinfo: format!("{base}/protocol/openid-connect/userinfo"),
        }
    }
}

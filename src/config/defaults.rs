//! Default configuration constants.

/// Embedded default `mercato.toml` template written on first run.
pub(super) const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/mercato.toml");
/// Environment selected when the file names none and --env is omitted.
pub(super) const DEFAULT_ENVIRONMENT_NAME: &str = "production";
/// Issuer of the production realm.
pub(super) const DEFAULT_ISSUER: &str = "https://id.mercato.example/realms/mercato";
/// Public OAuth client id registered for this CLI.
pub(super) const DEFAULT_CLIENT_ID: &str = "mercato-cli";
/// Loopback port for the sign-in redirect.
pub(super) const DEFAULT_REDIRECT_PORT: u16 = 8732;

/// Scopes requested at sign-in; `offline_access` enables refresh tokens.
pub(super) fn default_scopes() -> Vec<String> {
    ["openid", "profile", "email", "offline_access"]
        .into_iter()
        .map(String::from)
        .collect()
}

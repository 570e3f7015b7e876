//! Configuration data model.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::defaults::{
    default_scopes, DEFAULT_CLIENT_ID, DEFAULT_ENVIRONMENT_NAME, DEFAULT_ISSUER,
    DEFAULT_REDIRECT_PORT,
};

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resolved active environment settings.
    pub environment: EnvironmentConfig,
    /// Name of the active environment.
    pub active: String,
    /// All configured environments keyed by name.
    pub environments: BTreeMap<String, EnvironmentConfig>,
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        let environment = EnvironmentConfig::default();
        let mut environments = BTreeMap::new();
        environments.insert(DEFAULT_ENVIRONMENT_NAME.to_string(), environment.clone());
        Self {
            environment,
            active: DEFAULT_ENVIRONMENT_NAME.to_string(),
            environments,
            display: DisplayConfig::default(),
        }
    }
}

/// One Mercato deployment plus its identity provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub issuer: String,
    pub client_id: String,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// OIDC `prompt` sent on every sign-in from this environment.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Preferred IdP login-page locales.
    #[serde(default)]
    pub ui_locales: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            scopes: default_scopes(),
            prompt: None,
            ui_locales: None,
        }
    }
}

impl EnvironmentConfig {
    /// Loopback redirect URI registered for the native client.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }
}

fn default_redirect_port() -> u16 {
    DEFAULT_REDIRECT_PORT
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

/// Raw TOML file shape before resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct FileConfig {
    #[serde(default)]
    pub(super) default_environment: Option<String>,
    #[serde(default)]
    pub(super) environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub(super) display: FileDisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct FileDisplayConfig {
    #[serde(default = "default_true")]
    pub(super) color: bool,
}

impl Default for FileDisplayConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

fn default_true() -> bool {
    true
}

//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`MERCATO_ENV`, `MERCATO_ISSUER`,
//!    `MERCATO_CLIENT_ID`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./mercato.toml in the current directory
//! 4. $XDG_CONFIG_HOME/mercato/mercato.toml (or ~/.config/mercato/mercato.toml)
//! 5. Built-in defaults

use crate::error::ConfigError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

mod defaults;
mod types;

use defaults::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_ENVIRONMENT_NAME};
pub use types::{Config, DisplayConfig, EnvironmentConfig};
use types::FileConfig;

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from the --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    let file = read_file_config(path_override)?;
    resolve_config(file, &|key| std::env::var(key).ok())
}

/// Switch the active environment after loading.
pub fn select_environment(config: &mut Config, name: &str) -> Result<(), ConfigError> {
    let Some(environment) = config.environments.get(name) else {
        let known = config
            .environments
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ConfigError::Invalid(format!(
            "unknown environment `{name}` (configured: {known})"
        )));
    };
    config.environment = environment.clone();
    config.active = name.to_string();
    Ok(())
}

/// Return the per-user config root (`~/.config` or `$XDG_CONFIG_HOME`).
pub fn config_root_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .or_else(dirs::config_dir)
}

/// Return the default per-user config path (`~/.config/mercato/mercato.toml`).
pub fn default_global_config_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("mercato").join("mercato.toml"))
}

/// Ensure the default global config file exists, writing the commented
/// template on first run. Returns the path when resolvable on this platform.
pub fn ensure_default_global_config() -> Result<Option<PathBuf>, ConfigError> {
    let Some(path) = default_global_config_path() else {
        return Ok(None);
    };
    ensure_default_global_config_at_path(&path)?;
    Ok(Some(path))
}

fn ensure_default_global_config_at_path(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // create_new avoids clobbering a file another process wrote first.
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(DEFAULT_CONFIG_TEMPLATE.as_bytes())?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Read the highest-precedence config file that exists.
fn read_file_config(path_override: Option<&str>) -> Result<FileConfig, ConfigError> {
    if let Some(explicit) = path_override {
        let text = std::fs::read_to_string(explicit).map_err(|err| {
            ConfigError::Invalid(format!("cannot read config file `{explicit}`: {err}"))
        })?;
        return Ok(toml::from_str(&text)?);
    }

    let local = Path::new("mercato.toml");
    if local.exists() {
        let text = std::fs::read_to_string(local)?;
        return Ok(toml::from_str(&text)?);
    }

    if let Some(global) = default_global_config_path() {
        if global.exists() {
            let text = std::fs::read_to_string(&global)?;
            return Ok(toml::from_str(&text)?);
        }
    }

    Ok(FileConfig::default())
}

/// Resolve a parsed file plus an environment-variable lookup into the final
/// runtime config. Injectable lookup keeps this testable without touching
/// the process environment.
fn resolve_config(
    file: FileConfig,
    env_var: &dyn Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if !file.environments.is_empty() {
        config.environments = file.environments;
    }

    let active = env_var("MERCATO_ENV")
        .filter(|name| !name.trim().is_empty())
        .or(file.default_environment)
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT_NAME.to_string());

    let Some(environment) = config.environments.get(&active) else {
        let known = config
            .environments
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ConfigError::Invalid(format!(
            "default environment `{active}` is not configured (configured: {known})"
        )));
    };
    config.environment = environment.clone();
    config.active = active;

    // Direct overrides for one-off runs against another realm.
    if let Some(issuer) = env_var("MERCATO_ISSUER").filter(|v| !v.trim().is_empty()) {
        config.environment.issuer = issuer;
    }
    if let Some(client_id) = env_var("MERCATO_CLIENT_ID").filter(|v| !v.trim().is_empty()) {
        config.environment.client_id = client_id;
    }

    config.display.color = file.display.color;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn parse(text: &str) -> FileConfig {
        toml::from_str(text).expect("fixture parses")
    }

    #[test]
    fn empty_file_resolves_to_builtin_defaults() {
        let config = resolve_config(FileConfig::default(), &no_env).expect("resolve");
        assert_eq!(config.active, "production");
        assert_eq!(config.environment.client_id, "mercato-cli");
        assert!(config.display.color);
    }

    #[test]
    fn file_environments_replace_defaults() {
        let file = parse(
            r#"
            default_environment = "staging"

            [environments.staging]
            issuer = "https://id.staging.example/realms/mercato"
            client_id = "mercato-cli-staging"
            redirect_port = 9001
            "#,
        );
        let config = resolve_config(file, &no_env).expect("resolve");
        assert_eq!(config.active, "staging");
        assert_eq!(
            config.environment.issuer,
            "https://id.staging.example/realms/mercato"
        );
        assert_eq!(config.environment.redirect_port, 9001);
        // Omitted scopes fall back to the defaults, offline_access included.
        assert!(config
            .environment
            .scopes
            .iter()
            .any(|s| s == "offline_access"));
    }

    #[test]
    fn unknown_default_environment_is_an_error() {
        let file = parse(
            r#"
            default_environment = "missing"

            [environments.production]
            issuer = "https://id.example/realms/m"
            client_id = "cli"
            "#,
        );
        let err = resolve_config(file, &no_env).expect_err("unknown environment");
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn mercato_env_overrides_file_default() {
        let file = parse(
            r#"
            default_environment = "production"

            [environments.production]
            issuer = "https://id.example/realms/m"
            client_id = "cli"

            [environments.staging]
            issuer = "https://id.staging.example/realms/m"
            client_id = "cli"
            "#,
        );
        let env = |key: &str| (key == "MERCATO_ENV").then(|| "staging".to_string());
        let config = resolve_config(file, &env).expect("resolve");
        assert_eq!(config.active, "staging");
    }

    #[test]
    fn issuer_and_client_id_env_overrides_apply() {
        let env = |key: &str| match key {
            "MERCATO_ISSUER" => Some("https://other.example/realms/x".to_string()),
            "MERCATO_CLIENT_ID" => Some("override-cli".to_string()),
            _ => None,
        };
        let config = resolve_config(FileConfig::default(), &env).expect("resolve");
        assert_eq!(config.environment.issuer, "https://other.example/realms/x");
        assert_eq!(config.environment.client_id, "override-cli");
    }

    #[test]
    fn select_environment_switches_active() {
        let file = parse(
            r#"
            [environments.production]
            issuer = "https://id.example/realms/m"
            client_id = "cli"

            [environments.staging]
            issuer = "https://id.staging.example/realms/m"
            client_id = "cli"
            "#,
        );
        let mut config = resolve_config(file, &no_env).expect("resolve");
        select_environment(&mut config, "staging").expect("select");
        assert_eq!(config.active, "staging");
        assert!(select_environment(&mut config, "absent").is_err());
    }

    #[test]
    fn embedded_template_parses_and_resolves() {
        let file = parse(DEFAULT_CONFIG_TEMPLATE);
        let config = resolve_config(file, &no_env).expect("template resolves");
        assert_eq!(config.active, "production");
        assert_eq!(config.environment.redirect_port, 8732);
    }

    #[test]
    fn template_write_is_idempotent() {
        let dir = crate::testsupport::TestTempDir::new("config-init");
        let path = dir.child("mercato.toml");
        ensure_default_global_config_at_path(&path).expect("first write");
        let first = std::fs::read_to_string(&path).expect("read");
        ensure_default_global_config_at_path(&path).expect("second write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), first);
    }
}

//! Persistent session store.
//!
//! Saved tokens live in one JSON file under the user config root, keyed by
//! environment name and sealed by `auth::crypto`. Early mercato builds wrote
//! the file in plaintext; those stores are migrated to the encrypted format
//! the first time they are loaded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::config_root_dir;

use super::crypto::{decrypt_store, encrypt_store, looks_encrypted_store, EncryptedSessionStore};
use super::error::AuthError;
use super::types::{SessionHealth, TokenSet};

/// In-memory shape of the session store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct SessionStore {
    /// Schema version of the on-disk record.
    #[serde(default)]
    pub(crate) version: u32,
    /// Token sets keyed by environment name (`production`, `staging`, ...).
    #[serde(default)]
    pub(crate) environments: BTreeMap<String, TokenSet>,
}

/// Default session file path (`~/.config/mercato/session.json`).
pub fn default_session_store_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("mercato").join("session.json"))
}

/// Load saved tokens for an environment.
pub fn load_environment_tokens(environment: &str) -> Result<Option<TokenSet>, AuthError> {
    let Some(path) = default_session_store_path() else {
        return Ok(None);
    };
    load_environment_tokens_at(&path, environment)
}

pub(crate) fn load_environment_tokens_at(
    path: &Path,
    environment: &str,
) -> Result<Option<TokenSet>, AuthError> {
    let store = load_store(path)?;
    Ok(store.environments.get(environment).cloned())
}

/// Save tokens for an environment.
pub fn save_environment_tokens(environment: &str, tokens: TokenSet) -> Result<(), AuthError> {
    let Some(path) = default_session_store_path() else {
        return Err(AuthError::Invalid(
            "unable to resolve a config root for session storage".to_string(),
        ));
    };
    save_environment_tokens_at(&path, environment, tokens)
}

pub(crate) fn save_environment_tokens_at(
    path: &Path,
    environment: &str,
    tokens: TokenSet,
) -> Result<(), AuthError> {
    let mut store = load_store(path)?;
    store.environments.insert(environment.to_string(), tokens);
    write_store(path, &store)
}

/// Remove the saved session for an environment.
///
/// Returns `true` when a session was removed.
pub fn clear_environment_tokens(environment: &str) -> Result<bool, AuthError> {
    let Some(path) = default_session_store_path() else {
        return Ok(false);
    };
    clear_environment_tokens_at(&path, environment)
}

pub(crate) fn clear_environment_tokens_at(
    path: &Path,
    environment: &str,
) -> Result<bool, AuthError> {
    let mut store = load_store(path)?;
    let removed = store.environments.remove(environment).is_some();
    if removed {
        write_store(path, &store)?;
    }
    Ok(removed)
}

/// Inspect the stored session for an environment without modifying it.
pub fn session_health(environment: &str) -> Result<SessionHealth, AuthError> {
    let tokens = load_environment_tokens(environment)?;
    Ok(SessionHealth {
        environment: environment.to_string(),
        has_tokens: tokens.is_some(),
        expired: tokens.as_ref().is_some_and(TokenSet::is_expired),
        can_refresh: tokens.as_ref().is_some_and(TokenSet::can_refresh),
        expires_at_unix: tokens.map(|value| value.expires_at_unix),
    })
}

/// Load and decode the session store, migrating legacy plaintext files.
pub(crate) fn load_store(path: &Path) -> Result<SessionStore, AuthError> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
                AuthError::Invalid(format!(
                    "failed to parse session store `{}`: {err}",
                    path.display()
                ))
            })?;

            if looks_encrypted_store(&value) {
                let sealed: EncryptedSessionStore =
                    serde_json::from_value(value).map_err(|err| {
                        AuthError::Invalid(format!(
                            "failed to parse encrypted session store `{}`: {err}",
                            path.display()
                        ))
                    })?;
                return decrypt_store(&sealed);
            }

            // Legacy plaintext format: readable, then re-written sealed.
            let parsed: SessionStore = serde_json::from_value(value).map_err(|err| {
                AuthError::Invalid(format!(
                    "failed to parse session store `{}`: {err}",
                    path.display()
                ))
            })?;
            if !parsed.environments.is_empty() {
                // Best-effort migration; keep serving plaintext if it fails.
                let _ = write_store(path, &parsed);
            }
            Ok(parsed)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SessionStore::default()),
        Err(err) => Err(AuthError::Io(err)),
    }
}

/// Seal and persist the store with restrictive permissions.
pub(crate) fn write_store(path: &Path, store: &SessionStore) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
        }
    }

    let sealed = encrypt_store(store)?;
    let text = serde_json::to_string_pretty(&sealed).map_err(|err| {
        AuthError::Invalid(format!("failed to serialize session store: {err}"))
    })?;

    let mut options = std::fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    fn tokens(access: &str) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: Some(format!("refresh-{access}")),
            id_token: None,
            scope: None,
            expires_at_unix: 1_900_000_000,
        }
    }

    #[test]
    fn save_load_round_trips_per_environment() {
        let dir = TestTempDir::new("store");
        let path = dir.child("session.json");

        save_environment_tokens_at(&path, "production", tokens("at-prod")).expect("save prod");
        save_environment_tokens_at(&path, "staging", tokens("at-stage")).expect("save stage");

        let prod = load_environment_tokens_at(&path, "production")
            .expect("load")
            .expect("present");
        assert_eq!(prod.access_token, "at-prod");
        let stage = load_environment_tokens_at(&path, "staging")
            .expect("load")
            .expect("present");
        assert_eq!(stage.access_token, "at-stage");
        assert!(load_environment_tokens_at(&path, "dev")
            .expect("load")
            .is_none());
    }

    // Verifies the persisted file is sealed: no token plaintext on disk.
    #[test]
    fn written_store_is_encrypted() {
        let dir = TestTempDir::new("store-sealed");
        let path = dir.child("session.json");
        save_environment_tokens_at(&path, "production", tokens("secret-access")).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read raw file");
        assert!(raw.contains("\"encryption\""), "raw: {raw}");
        assert!(!raw.contains("secret-access"), "token leaked to disk");
    }

    // Verifies legacy plaintext stores still load and get migrated.
    #[test]
    fn plaintext_store_is_migrated_on_load() {
        let dir = TestTempDir::new("store-migrate");
        let path = dir.child("session.json");

        let mut legacy = SessionStore::default();
        legacy
            .environments
            .insert("production".to_string(), tokens("legacy-access"));
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&legacy).expect("serialize legacy"),
        )
        .expect("write legacy fixture");

        let loaded = load_store(&path).expect("load + migrate");
        assert_eq!(
            loaded
                .environments
                .get("production")
                .map(|t| t.access_token.as_str()),
            Some("legacy-access")
        );

        let migrated = std::fs::read_to_string(&path).expect("read migrated file");
        assert!(migrated.contains("\"encryption\""), "raw: {migrated}");
        assert!(!migrated.contains("legacy-access"), "plaintext remained");
    }

    #[test]
    fn missing_file_loads_empty_store() {
        let dir = TestTempDir::new("store-missing");
        let store = load_store(&dir.child("absent.json")).expect("default");
        assert!(store.environments.is_empty());
    }

    #[test]
    fn clear_removes_only_the_named_environment() {
        let dir = TestTempDir::new("store-clear");
        let path = dir.child("session.json");
        save_environment_tokens_at(&path, "production", tokens("a")).expect("save");
        save_environment_tokens_at(&path, "staging", tokens("b")).expect("save");

        assert!(clear_environment_tokens_at(&path, "production").expect("clear"));
        assert!(!clear_environment_tokens_at(&path, "production").expect("clear again"));
        assert!(load_environment_tokens_at(&path, "staging")
            .expect("load")
            .is_some());
    }

    #[test]
    fn tampered_store_reports_decrypt_failure() {
        let dir = TestTempDir::new("store-tamper");
        let path = dir.child("session.json");
        save_environment_tokens_at(&path, "production", tokens("a")).expect("save");

        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read"))
                .expect("parse json");
        let ciphertext = value["environments"]["production"]["ciphertext"]
            .as_str()
            .expect("ciphertext")
            .to_string();
        value["environments"]["production"]["ciphertext"] =
            serde_json::Value::String(format!("{ciphertext}AA"));
        std::fs::write(&path, value.to_string()).expect("write tampered");

        let err = load_store(&path).expect_err("tampered store must fail");
        assert!(err.to_string().contains("failed to decrypt"));
    }
}

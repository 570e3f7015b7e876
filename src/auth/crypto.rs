//! Machine-derived encryption-at-rest for the session store.
//!
//! Tokens never sit on disk in plaintext. A key-encryption key is derived
//! from stable machine identity material via scrypt, and wraps a random
//! data-encryption key that seals each environment's token record with
//! AES-256-GCM-SIV. Moving the file to another machine makes it undecryptable,
//! which is the intended failure mode.

use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use scrypt::{scrypt, Params as ScryptParams};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::error::AuthError;
use super::store::SessionStore;
use super::types::TokenSet;

pub(crate) const SESSION_STORE_VERSION_ENCRYPTED: u32 = 2;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const MACHINE_KEY_CONTEXT: &str = "mercato-session-kek-v1";

/// On-disk shape of an encrypted session store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EncryptedSessionStore {
    #[serde(default)]
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) encryption: EncryptionEnvelope,
    #[serde(default)]
    pub(crate) environments: BTreeMap<String, EncryptedRecord>,
}

/// Wrapped data-encryption key plus its derivation salt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EncryptionEnvelope {
    #[serde(default)]
    pub(crate) salt: String,
    #[serde(default)]
    pub(crate) wrapped_dek_nonce: String,
    #[serde(default)]
    pub(crate) wrapped_dek_ciphertext: String,
}

/// One sealed token record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EncryptedRecord {
    #[serde(default)]
    pub(crate) nonce: String,
    #[serde(default)]
    pub(crate) ciphertext: String,
}

/// Distinguishes the encrypted format from legacy plaintext files.
pub(crate) fn looks_encrypted_store(value: &serde_json::Value) -> bool {
    value
        .get("encryption")
        .and_then(|inner| inner.as_object())
        .is_some()
}

pub(crate) fn encrypt_store(store: &SessionStore) -> Result<EncryptedSessionStore, AuthError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let kek = derive_machine_kek(&salt)?;

    let mut dek = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut dek);
    let (wrapped_dek_nonce, wrapped_dek_ciphertext) = encrypt_blob(&kek, &dek)?;

    let mut environments = BTreeMap::new();
    for (environment, tokens) in &store.environments {
        environments.insert(environment.clone(), encrypt_record(&dek, tokens)?);
    }

    Ok(EncryptedSessionStore {
        version: SESSION_STORE_VERSION_ENCRYPTED,
        encryption: EncryptionEnvelope {
            salt: B64.encode(salt),
            wrapped_dek_nonce: B64.encode(wrapped_dek_nonce),
            wrapped_dek_ciphertext: B64.encode(wrapped_dek_ciphertext),
        },
        environments,
    })
}

pub(crate) fn decrypt_store(store: &EncryptedSessionStore) -> Result<SessionStore, AuthError> {
    let salt = decode_fixed::<SALT_LEN>(&store.encryption.salt, "salt")?;
    let kek = derive_machine_kek(&salt)?;
    let wrapped_nonce =
        decode_fixed::<NONCE_LEN>(&store.encryption.wrapped_dek_nonce, "wrapped_dek_nonce")?;
    let wrapped_dek = decode_bytes(
        &store.encryption.wrapped_dek_ciphertext,
        "wrapped_dek_ciphertext",
    )?;
    let dek_raw = decrypt_blob(&kek, &wrapped_nonce, &wrapped_dek).map_err(|_| {
        AuthError::Invalid(
            "failed to decrypt the session store (machine identity may have changed); run `mercato login` again"
                .to_string(),
        )
    })?;
    if dek_raw.len() != KEY_LEN {
        return Err(AuthError::Invalid(
            "invalid key material in the session store".to_string(),
        ));
    }
    let mut dek = [0u8; KEY_LEN];
    dek.copy_from_slice(&dek_raw);

    let mut environments = BTreeMap::new();
    for (environment, record) in &store.environments {
        let tokens = decrypt_record(&dek, record).map_err(|_| {
            AuthError::Invalid(format!(
                "failed to decrypt the saved session for environment `{environment}`; run `mercato login` again"
            ))
        })?;
        environments.insert(environment.clone(), tokens);
    }

    Ok(SessionStore {
        version: store.version.max(SESSION_STORE_VERSION_ENCRYPTED),
        environments,
    })
}

fn encrypt_record(key: &[u8; KEY_LEN], tokens: &TokenSet) -> Result<EncryptedRecord, AuthError> {
    let payload = serde_json::to_vec(tokens)
        .map_err(|err| AuthError::Invalid(format!("failed to serialize token record: {err}")))?;
    let (nonce, ciphertext) = encrypt_blob(key, &payload)?;
    Ok(EncryptedRecord {
        nonce: B64.encode(nonce),
        ciphertext: B64.encode(ciphertext),
    })
}

fn decrypt_record(key: &[u8; KEY_LEN], record: &EncryptedRecord) -> Result<TokenSet, AuthError> {
    let nonce = decode_fixed::<NONCE_LEN>(&record.nonce, "nonce")?;
    let ciphertext = decode_bytes(&record.ciphertext, "ciphertext")?;
    let payload = decrypt_blob(key, &nonce, &ciphertext)
        .map_err(|_| AuthError::Invalid("failed to decrypt token record".to_string()))?;
    serde_json::from_slice(&payload)
        .map_err(|err| AuthError::Invalid(format!("failed to decode token record: {err}")))
}

fn derive_machine_kek(salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN], AuthError> {
    let mut material = machine_secret_material();
    material.extend_from_slice(salt);

    let mut hashed = Sha256::new();
    hashed.update(MACHINE_KEY_CONTEXT.as_bytes());
    hashed.update(&material);
    let seed = hashed.finalize();

    let params = ScryptParams::recommended();
    let mut key = [0u8; KEY_LEN];
    scrypt(&seed, salt, &params, &mut key)
        .map_err(|err| AuthError::Invalid(format!("failed to derive machine key: {err}")))?;
    Ok(key)
}

fn machine_secret_material() -> Vec<u8> {
    let host = hostname::get()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string());
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string());
    let home = dirs::home_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    let machine_id = read_machine_id().unwrap_or_default();
    format!(
        "os={}|host={host}|user={user}|home={home}|machine_id={machine_id}",
        std::env::consts::OS
    )
    .into_bytes()
}

fn read_machine_id() -> Option<String> {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostid"] {
        if let Ok(value) = std::fs::read_to_string(path) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn encrypt_blob(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), AuthError> {
    let cipher = Aes256GcmSiv::new_from_slice(key)
        .map_err(|_| AuthError::Invalid("invalid encryption key length".to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| AuthError::Invalid("failed to encrypt session data".to_string()))?;
    Ok((nonce.to_vec(), ciphertext))
}

fn decrypt_blob(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AuthError> {
    let cipher = Aes256GcmSiv::new_from_slice(key)
        .map_err(|_| AuthError::Invalid("invalid encryption key length".to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AuthError::Invalid("failed to decrypt session data".to_string()))
}

fn decode_bytes(value: &str, field: &str) -> Result<Vec<u8>, AuthError> {
    B64.decode(value)
        .map_err(|err| AuthError::Invalid(format!("failed to decode store field `{field}`: {err}")))
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N], AuthError> {
    let bytes = decode_bytes(value, field)?;
    if bytes.len() != N {
        return Err(AuthError::Invalid(format!(
            "invalid store field `{field}` length: expected {N}, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

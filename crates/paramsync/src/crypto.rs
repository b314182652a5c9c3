//! Encryption of `SecureString` values for the local store.
//!
//! Values are sealed with AES-256-GCM under a key selected by the
//! parameter's KMS key id. The parameter name is bound as associated data,
//! so a ciphertext copied to another name no longer decrypts. That mirrors
//! the encryption context a hosted store attaches to every secure value.
//!
//! Key material is resolved in priority order from a direct value, a file
//! or an environment variable, and is kept in [`SecretString`] until the
//! ciphers are built.

use std::collections::BTreeMap;
use std::fs;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum KeyRingError {
    #[error("No key source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read key material from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Unknown key id '{0}'")]
    UnknownKey(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),
}

pub type Result<T> = std::result::Result<T, KeyRingError>;

/// Default environment variable holding key material.
pub const KEYRING_ENV_VAR: &str = "PARAMSYNC_KEYS";

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Resolves key material from a direct value, a file, or an environment
/// variable, in that order. Empty strings count as absent.
pub fn resolve_key_material(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|e| KeyRingError::FileReadError {
                path: expanded,
                source: e,
            });
    }

    if let Some(var_name) = env_var.filter(|v| !v.is_empty()) {
        return match std::env::var(var_name) {
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(KeyRingError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(KeyRingError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(KeyRingError::NoSourceProvided)
}

fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// AES-256-GCM ciphers indexed by KMS key id.
#[derive(Clone, Default)]
pub struct KeyRing {
    keys: BTreeMap<String, Aes256Gcm>,
}

impl KeyRing {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses key material of the form `key-id=<64 hex chars>`, one entry
    /// per line or comma separated.
    pub fn from_material(material: &SecretString) -> Result<Self> {
        let mut ring = Self::empty();
        for entry in material
            .expose_secret()
            .split(|c| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|e| !e.is_empty() && !e.starts_with('#'))
        {
            let (key_id, key_hex) = entry.split_once('=').ok_or_else(|| {
                KeyRingError::InvalidKey("expected entries of the form key-id=hex".to_string())
            })?;
            ring.insert_hex(key_id.trim(), key_hex.trim())?;
        }
        Ok(ring)
    }

    pub fn insert_hex(&mut self, key_id: &str, key_hex: &str) -> Result<()> {
        let key_bytes = hex_decode(key_hex)
            .map_err(|e| KeyRingError::InvalidKey(format!("Invalid hex key for '{}': {}", key_id, e)))?;

        if key_bytes.len() != 32 {
            return Err(KeyRingError::InvalidKey(format!(
                "Key '{}' must be 32 bytes (64 hex chars), got {} bytes",
                key_id,
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| KeyRingError::InvalidKey(format!("Failed to create cipher: {}", e)))?;
        self.keys.insert(key_id.to_string(), cipher);
        Ok(())
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Encrypts `plaintext` for parameter `name`.
    ///
    /// Format: hex of `<12-byte nonce><ciphertext>`.
    pub fn encrypt(&self, key_id: &str, name: &str, plaintext: &str) -> Result<String> {
        let cipher = self
            .keys
            .get(key_id)
            .ok_or_else(|| KeyRingError::UnknownKey(key_id.to_string()))?;

        let nonce_bytes = rand_bytes::<NONCE_SIZE>()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| KeyRingError::EncryptionError(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(hex_encode(&combined))
    }

    pub fn decrypt(&self, key_id: &str, name: &str, ciphertext_hex: &str) -> Result<String> {
        let cipher = self
            .keys
            .get(key_id)
            .ok_or_else(|| KeyRingError::UnknownKey(key_id.to_string()))?;

        let combined = hex_decode(ciphertext_hex)
            .map_err(|e| KeyRingError::DecryptionError(format!("Invalid hex: {}", e)))?;
        if combined.len() < NONCE_SIZE {
            return Err(KeyRingError::DecryptionError(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| KeyRingError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| KeyRingError::DecryptionError(format!("Invalid UTF-8: {}", e)))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("Hex string must have even length".to_string());
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .ok_or_else(|| format!("Invalid hex at position {}", i))
                .and_then(|pair| {
                    u8::from_str_radix(pair, 16)
                        .map_err(|e| format!("Invalid hex at position {}: {}", i, e))
                })
        })
        .collect()
}

fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(|e| {
        KeyRingError::EncryptionError(format!("Failed to generate random bytes: {}", e))
    })?;
    Ok(bytes)
}

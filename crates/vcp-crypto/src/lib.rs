// SPDX-License-Identifier: MIT OR Apache-2.0
//! vcp-crypto
//!
//! Per-tenant data keys with monotonically increasing versions, persisted
//! in a single JSON key file, and AES-256-GCM envelope encryption with
//! caller-supplied AAD.
//!
//! Only the current key version is retained: rotation replaces the key
//! material, and envelopes written under earlier versions are no longer
//! decryptable.
#![deny(unsafe_code)]

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const ENVELOPE_ALG: &str = "AES-256-GCM";

/// Key-store or envelope failure.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid key entry for startup_id={startup_id}")]
    InvalidKeyEntry { startup_id: String },
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    #[error("encryption failed")]
    EncryptFailed,
    /// Wrong key, wrong AAD, or tampered ciphertext.
    #[error("decryption failed")]
    DecryptFailed,
}

/// On-disk ciphertext container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub alg: String,
    pub key_version: u32,
    pub nonce_b64: String,
    pub ciphertext_b64: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyEntry {
    wrapped_key: String,
    version: u32,
    created_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyDoc {
    #[serde(default)]
    keys: BTreeMap<String, KeyEntry>,
}

/// Outcome of a key rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRotation {
    pub startup_id: String,
    pub version: u32,
}

/// Per-tenant key file backed by `data/vc_keys.json`.
///
/// Read-modify-write happens from the central process only; the file holds
/// one current key entry per tenant.
#[derive(Debug, Clone)]
pub struct KeyStore {
    key_file: PathBuf,
}

impl KeyStore {
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self { key_file: key_file.into() }
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    fn load_doc(&self) -> KeyDoc {
        let Ok(raw) = std::fs::read(&self.key_file) else {
            return KeyDoc::default();
        };
        serde_json::from_slice(&raw).unwrap_or_default()
    }

    fn save_doc(&self, doc: &KeyDoc) -> Result<(), CryptoError> {
        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_vec_pretty(doc)?;
        std::fs::write(&self.key_file, rendered)?;
        Ok(())
    }

    fn fresh_entry(version: u32) -> KeyEntry {
        let mut key = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        KeyEntry {
            wrapped_key: BASE64.encode(key),
            version,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Current key material and version, creating version 1 lazily.
    fn ensure_key(&self, startup_id: &str) -> Result<([u8; KEY_BYTES], u32), CryptoError> {
        let mut doc = self.load_doc();
        if !doc.keys.contains_key(startup_id) {
            doc.keys.insert(startup_id.to_string(), Self::fresh_entry(1));
            self.save_doc(&doc)?;
        }
        let entry = doc
            .keys
            .get(startup_id)
            .ok_or_else(|| CryptoError::InvalidKeyEntry { startup_id: startup_id.into() })?;
        let raw = BASE64
            .decode(&entry.wrapped_key)
            .map_err(|_| CryptoError::InvalidKeyEntry { startup_id: startup_id.into() })?;
        let key: [u8; KEY_BYTES] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyEntry { startup_id: startup_id.into() })?;
        Ok((key, entry.version))
    }

    /// Replace the tenant key with fresh material at version + 1.
    pub fn rotate_key(&self, startup_id: &str) -> Result<KeyRotation, CryptoError> {
        let mut doc = self.load_doc();
        let current_version = doc.keys.get(startup_id).map(|e| e.version).unwrap_or(0);
        let next_version = current_version.max(0) + 1;
        doc.keys.insert(startup_id.to_string(), Self::fresh_entry(next_version));
        self.save_doc(&doc)?;
        Ok(KeyRotation {
            startup_id: startup_id.to_string(),
            version: next_version,
        })
    }

    /// Encrypt plaintext under the tenant's current key.
    ///
    /// The AAD binds the ciphertext to its context (e.g. a collection id);
    /// decryption requires the identical AAD.
    pub fn encrypt(
        &self,
        startup_id: &str,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Envelope, CryptoError> {
        let (key, version) = self.ensure_key(startup_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptFailed)?;
        Ok(Envelope {
            alg: ENVELOPE_ALG.to_string(),
            key_version: version,
            nonce_b64: BASE64.encode(nonce),
            ciphertext_b64: BASE64.encode(ciphertext),
            created_at: Utc::now().to_rfc3339(),
        })
    }

    /// Decrypt an envelope with the tenant's current key.
    pub fn decrypt(
        &self,
        startup_id: &str,
        envelope: &Envelope,
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if envelope.nonce_b64.is_empty() || envelope.ciphertext_b64.is_empty() {
            return Err(CryptoError::InvalidEnvelope(
                "nonce_b64/ciphertext_b64 required".into(),
            ));
        }
        let nonce = BASE64
            .decode(&envelope.nonce_b64)
            .map_err(|e| CryptoError::InvalidEnvelope(e.to_string()))?;
        if nonce.len() != NONCE_BYTES {
            return Err(CryptoError::InvalidEnvelope("nonce must be 12 bytes".into()));
        }
        let ciphertext = BASE64
            .decode(&envelope.ciphertext_b64)
            .map_err(|e| CryptoError::InvalidEnvelope(e.to_string()))?;
        let (key, _) = self.ensure_key(startup_id)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: &ciphertext, aad })
            .map_err(|_| CryptoError::DecryptFailed)
    }
}

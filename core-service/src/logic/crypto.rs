//! Symmetric Encryption
//!
//! AES-256-GCM with a fresh 96-bit IV per message and a fixed associated-data
//! tag per owner (vault, log store). Ciphertext and tag are stored apart so an
//! [`EncryptedBlob`] mirrors the persisted `{iv, ciphertext, authTag}` shape.
//!
//! Opening a blob either returns the full plaintext or fails with
//! [`CryptoError::Authentication`] - there is no partial output.

use std::fmt;
use std::fs;
use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Key size for AES-256 (32 bytes)
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Error type for encryption operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("authentication failed (tampered data or wrong key)")]
    Authentication,

    #[error("malformed blob: {0}")]
    Malformed(String),

    #[error("encryption failed")]
    Encryption,

    #[error("key file I/O: {0}")]
    KeyIo(#[from] std::io::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// KEY
// ============================================================================

/// 256-bit symmetric key. Never printed.
#[derive(Clone)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected {} bytes", KEY_SIZE)))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Load the key file, or generate and persist a new key when it is absent.
    ///
    /// A present but unreadable or malformed key file is an error: silently
    /// replacing it would orphan everything sealed under the old key.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let encoded = fs::read_to_string(path)?;
            let key = Self::from_hex(&encoded)?;
            log::info!("Loaded key: {}", path.display());
            return Ok(key);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let key = Self::generate();
        fs::write(path, key.to_hex())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        log::info!("Generated new key: {}", path.display());
        Ok(key)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

// ============================================================================
// BLOB
// ============================================================================

/// Persisted form of encrypted data (hex encoded fields)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub iv: String,
    pub ciphertext: String,
    pub auth_tag: String,
}

impl EncryptedBlob {
    fn decode(&self) -> Result<([u8; NONCE_SIZE], Vec<u8>, [u8; TAG_SIZE]), CryptoError> {
        let iv: [u8; NONCE_SIZE] = hex::decode(&self.iv)
            .map_err(|e| CryptoError::Malformed(format!("iv: {}", e)))?
            .try_into()
            .map_err(|_| CryptoError::Malformed("iv length".to_string()))?;
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|e| CryptoError::Malformed(format!("ciphertext: {}", e)))?;
        let tag: [u8; TAG_SIZE] = hex::decode(&self.auth_tag)
            .map_err(|e| CryptoError::Malformed(format!("tag: {}", e)))?
            .try_into()
            .map_err(|_| CryptoError::Malformed("tag length".to_string()))?;
        Ok((iv, ciphertext, tag))
    }
}

// ============================================================================
// CIPHER
// ============================================================================

/// AEAD cipher bound to one key and one associated-data tag.
pub struct Cipher {
    aead: Aes256Gcm,
    aad: &'static [u8],
}

impl Cipher {
    pub fn new(key: &SecretKey, aad: &'static [u8]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.0);
        Self {
            aead: Aes256Gcm::new(key),
            aad,
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
        let mut iv = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut iv);

        let mut sealed = self
            .aead
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: self.aad,
                },
            )
            .map_err(|_| CryptoError::Encryption)?;

        // aes-gcm appends the tag to the ciphertext
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(EncryptedBlob {
            iv: hex::encode(iv),
            ciphertext: hex::encode(sealed),
            auth_tag: hex::encode(tag),
        })
    }

    pub fn open(&self, blob: &EncryptedBlob) -> Result<Vec<u8>, CryptoError> {
        let (iv, mut combined, tag) = blob.decode()?;
        combined.extend_from_slice(&tag);

        self.aead
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &combined,
                    aad: self.aad,
                },
            )
            .map_err(|_| CryptoError::Authentication)
    }
}

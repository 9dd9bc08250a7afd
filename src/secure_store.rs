//! Key-file encryption for credentials stored on local disk.
//!
//! A random 256-bit key is generated once and kept next to the data it
//! protects (`0600`). Payloads are ChaCha20-Poly1305 sealed and stored as a
//! small JSON envelope.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;

const VERSION: u8 = 1;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedPayload {
    version: u8,
    nonce: String,
    ciphertext: String,
}

/// Symmetric key loaded from (or created at) a key file
#[derive(Clone)]
pub struct SecretKey([u8; KEY_LEN]);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl SecretKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Read the key at `path`, creating it on first use
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let encoded = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let bytes = STANDARD_NO_PAD
                .decode(encoded.trim())
                .context("Invalid key file encoding")?;
            let key: [u8; KEY_LEN] = bytes
                .try_into()
                .map_err(|_| anyhow!("Key file {} has the wrong length", path.display()))?;
            return Ok(Self(key));
        }

        let key = Self::generate();
        crate::storage::write_private_file(path, STANDARD_NO_PAD.encode(key.0).as_bytes())?;
        tracing::debug!("Generated new encryption key at {}", path.display());
        Ok(key)
    }

    pub fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|err| anyhow!("Encryption failed: {}", err))?;

        let payload = EncryptedPayload {
            version: VERSION,
            nonce: STANDARD_NO_PAD.encode(nonce_bytes),
            ciphertext: STANDARD_NO_PAD.encode(ciphertext),
        };

        Ok(serde_json::to_string(&payload)?)
    }

    pub fn decrypt_string(&self, payload: &str) -> Result<String> {
        let enc: EncryptedPayload =
            serde_json::from_str(payload).context("Encrypted payload is not valid JSON")?;
        if enc.version != VERSION {
            anyhow::bail!("Unsupported payload version {}", enc.version);
        }
        let nonce = STANDARD_NO_PAD
            .decode(enc.nonce)
            .context("Invalid nonce encoding")?;
        if nonce.len() != NONCE_LEN {
            anyhow::bail!("Invalid nonce length");
        }
        let ciphertext = STANDARD_NO_PAD
            .decode(enc.ciphertext)
            .context("Invalid ciphertext encoding")?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|err| anyhow!("Decryption failed (wrong key?): {}", err))?;

        Ok(String::from_utf8(plaintext)?)
    }
}

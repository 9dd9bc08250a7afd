//! Encrypted access token storage
//!
//! The long-lived GitHub access token is kept in `<data_dir>/.copilot_token`,
//! sealed with the key in `<data_dir>/.encryption_key`. Both files are
//! written atomically with 0600 permissions (owner read/write only).

use crate::secure_store::SecretKey;
use crate::storage::write_private_file;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const TOKEN_FILE: &str = ".copilot_token";
const KEY_FILE: &str = ".encryption_key";

/// Token storage format with version for future migrations
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    version: u32,
    access_token: String,
    /// When the token was stored (Unix timestamp)
    stored_at: u64,
}

/// Single-slot store for the OAuth access token
pub struct TokenStore {
    path: PathBuf,
    key_path: PathBuf,
    /// Serialises writes and deletes of the token file
    file_lock: Mutex<()>,
    #[cfg(test)]
    saves: std::sync::atomic::AtomicUsize,
}

impl TokenStore {
    /// Current storage schema version
    const VERSION: u32 = 1;

    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            path: data_dir.join(TOKEN_FILE),
            key_path: data_dir.join(KEY_FILE),
            file_lock: Mutex::new(()),
            #[cfg(test)]
            saves: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.file_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))
    }

    /// Load the access token.
    ///
    /// Returns `Ok(None)` when nothing is stored. A file that cannot be
    /// decrypted (tampered, or the key was lost) is removed so the user is
    /// sent back through the device flow.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read_to_string(&self.path).context("Failed to read token file")?;
        let key = SecretKey::load_or_create(&self.key_path)?;

        let plaintext = match key.decrypt_string(&sealed) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!("Stored Copilot token is unreadable, discarding it: {}", e);
                self.delete()?;
                return Ok(None);
            }
        };

        let stored: StoredToken =
            serde_json::from_str(&plaintext).context("Failed to parse token file")?;
        if stored.version > Self::VERSION {
            anyhow::bail!(
                "Token file version {} is newer than supported version {}",
                stored.version,
                Self::VERSION
            );
        }

        Ok(Some(stored.access_token))
    }

    /// Persist the access token, replacing any previous one
    pub fn save(&self, access_token: &str) -> Result<()> {
        let stored = StoredToken {
            version: Self::VERSION,
            access_token: access_token.to_string(),
            stored_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        let _guard = self.lock()?;
        let key = SecretKey::load_or_create(&self.key_path)?;
        let sealed = key.encrypt_string(&serde_json::to_string(&stored)?)?;
        write_private_file(&self.path, sealed.as_bytes())?;
        #[cfg(test)]
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        tracing::debug!("Saved Copilot token to {:?}", self.path);
        Ok(())
    }

    /// Delete the stored token; the key file is kept
    pub fn delete(&self) -> Result<()> {
        let _guard = self.lock()?;
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to delete token file")?;
            tracing::info!("Deleted Copilot token from {:?}", self.path);
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());

        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), None);

        store.save("gho_abc").unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap().as_deref(), Some("gho_abc"));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("gho_abc"));

        store.delete().unwrap();
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("first").unwrap();
        store.save("second").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_lost_key_discards_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("gho_abc").unwrap();

        std::fs::remove_file(dir.path().join(KEY_FILE)).unwrap();

        assert_eq!(store.load().unwrap(), None);
        assert!(!store.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("gho_abc").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

//! Token storage backends
//!
//! Adapters for [`ITokenStorage`]:
//!
//! - [`KeyringTokenStorage`] - OS credential store (GNOME Keyring, KWallet,
//!   macOS Keychain) under the service name `bracelet`
//! - [`FileTokenStorage`] - one file per key in a private directory, for
//!   headless hosts without a keyring daemon
//!
//! [`build_token_storage`] picks the backend named in the configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use bracelet_core::config::{StorageBackend, StorageConfig};
use bracelet_core::ports::{ITokenStorage, MemoryTokenStorage};

/// Keyring service name for stored tokens
const KEYRING_SERVICE: &str = "bracelet";

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// Stores token slots in the system keyring
///
/// Each slot key becomes the keyring username under the `bracelet` service.
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    service: String,
}

impl KeyringTokenStorage {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Uses a custom service name (e.g. one per deployment).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ITokenStorage for KeyringTokenStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => {
                debug!(key, "Loaded token slot from keyring");
                Ok(Some(value))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keyring")?;
        debug!(key, "Stored token slot in keyring");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => {
                info!(key, "Cleared token slot from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// FileTokenStorage
// ============================================================================

/// Stores each token slot as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    dir: PathBuf,
}

impl FileTokenStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl ITokenStorage for FileTokenStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read token file {}", path.display()))),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create token directory {}", self.dir.display())
        })?;
        let path = self.slot_path(key);
        fs::write(&path, value)
            .with_context(|| format!("Failed to write token file {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", path.display()))?;
        }

        debug!(key, path = %path.display(), "Stored token slot on disk");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to remove token file {}", path.display()))),
        }
    }
}

/// Builds the backend selected by `config.backend`.
pub fn build_token_storage(config: &StorageConfig) -> Arc<dyn ITokenStorage> {
    match config.backend {
        StorageBackend::Keyring => Arc::new(KeyringTokenStorage::new()),
        StorageBackend::File => Arc::new(FileTokenStorage::new(config.dir.clone())),
        StorageBackend::Memory => Arc::new(MemoryTokenStorage::new()),
    }
}

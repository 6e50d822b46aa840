//! Token persistence port
//!
//! The session keeps its OAuth token in two named slots: a durable one that
//! survives restarts and a transient one scoped to the current session.
//! Loading prefers the transient slot; saving always writes the durable slot
//! and clears the transient one.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because persistence failures are backend-specific
//!   (keyring daemon, filesystem, ...).
//! - Values are opaque strings (the session stores JSON).

use std::collections::HashMap;
use std::sync::Mutex;

/// Key of the durable token slot.
pub const DURABLE_TOKEN_KEY: &str = "token";
/// Key of the transient token slot.
pub const TRANSIENT_TOKEN_KEY: &str = "session-token";

/// Port trait for key/value token persistence
///
/// Calls are synchronous and short; adapters backed by slow stores are
/// expected to be called from a context that tolerates blocking briefly.
pub trait ITokenStorage: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn store(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process storage; nothing outlives the value.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.slots
            .lock()
            .map_err(|_| anyhow::anyhow!("token storage lock poisoned"))
    }
}

impl ITokenStorage for MemoryTokenStorage {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.slots()?.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.slots()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.slots()?.remove(key);
        Ok(())
    }
}

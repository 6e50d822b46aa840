//! User notification port (driven/secondary port)
//!
//! How a failure is surfaced to the person using the client: a blocking
//! dialog, a transient toast, or the dedicated upload advice shown when a
//! file transfer fails. Rendering is entirely up to the adapter.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because delivery is adapter-specific.
//! - Notifications are fire-and-forget.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Presentation of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Modal alert the user must acknowledge
    Dialog,
    /// Transient notification
    Toast,
    /// Advice shown after a failed upload
    UploadAdvice,
}

/// A resolved, user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub content: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Port trait for delivering notices to the user
#[async_trait::async_trait]
pub trait INotifier: Send + Sync {
    async fn notify(&self, notice: &Notice) -> anyhow::Result<()>;
}

/// Lookup of localized message text by key
pub trait IMessageCatalog: Send + Sync {
    /// Returns the text for `key`, or `None` if the catalog lacks it.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Catalog backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<String, String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.insert(key.into(), text.into());
        self
    }
}

impl IMessageCatalog for StaticCatalog {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

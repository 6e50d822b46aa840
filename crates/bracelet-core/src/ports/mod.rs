//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the core depends on and adapter crates
//! implement.
//!
//! ## Ports Overview
//!
//! - [`ITokenStorage`] - Persistence of the session's OAuth token
//! - [`IErrorReporter`] - External error-tracking sink
//! - [`INotifier`] / [`IMessageCatalog`] - User-facing messages

pub mod error_reporter;
pub mod notifier;
pub mod token_storage;

pub use error_reporter::{ErrorReport, IErrorReporter, ReportLevel};
pub use notifier::{IMessageCatalog, INotifier, Notice, NoticeKind, StaticCatalog};
pub use token_storage::{
    ITokenStorage, MemoryTokenStorage, DURABLE_TOKEN_KEY, TRANSIENT_TOKEN_KEY,
};

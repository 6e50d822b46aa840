//! CLI subcommands and the shared client context they run against

pub mod auth;
pub mod completions;
pub mod config;
pub mod resource;
pub mod upload;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bracelet_api::client::ApiClient;
use bracelet_api::exceptions::{ExceptionManager, TracingErrorReporter};
use bracelet_api::session::SessionManager;
use bracelet_api::storage::build_token_storage;
use bracelet_core::config::Config;
use bracelet_core::ports::{INotifier, Notice, NoticeKind, StaticCatalog};
use tracing::debug;

use crate::output::{get_formatter, OutputFormat};

/// Everything a command needs to talk to the platform.
pub struct CliContext {
    pub config: Config,
    pub api: ApiClient,
    pub session: Arc<SessionManager>,
    pub exceptions: ExceptionManager,
}

impl CliContext {
    /// Builds the API client, restores the stored session and wires the
    /// exception manager to the console.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate or the configured API
    /// host cannot be used to build a client.
    pub async fn build(config: Config, format: OutputFormat) -> Result<Self> {
        ensure_valid(&config)?;
        let api = ApiClient::new(&config.api).context("Failed to create API client")?;
        let storage = build_token_storage(&config.storage);
        let session = Arc::new(SessionManager::new(api.clone(), &config.oauth, storage));

        let restored = session.load_from_storage().await;
        debug!(restored, backend = ?config.storage.backend, "Session storage loaded");

        let exceptions =
            ExceptionManager::new(Arc::new(console_catalog()), Arc::new(TracingErrorReporter))
                .with_notifier(Arc::new(ConsoleNotifier { format }))
                .with_session(session.clone());

        Ok(Self {
            config,
            api,
            session,
            exceptions,
        })
    }
}

/// Rejects configurations that would let commands misbehave, e.g. a
/// multipart upload without workers.
fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    bail!(
        "Invalid configuration ({}); run 'bracelet config validate'",
        details.join("; ")
    )
}

/// Messages shown for the failures a terminal user can act on.
fn console_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with("exception.common.unknown.title", "Request failed")
        .with("exception.common.unknown.content", "Run again with -v for details.")
        .with("exception.common.network.default.title", "Could not reach the server")
        .with(
            "exception.common.network.default.content",
            "Check the api.host setting and your connection.",
        )
        .with("exception.common.404.default.title", "Not found")
        .with("exception.common.403.default.title", "Not allowed")
        .with("exception.uiCtx.100400.title", "Login failed")
        .with("exception.uiCtx.100400.content", "The server rejected the login request.")
        .with("exception.uiCtx.100401.title", "Invalid credentials")
        .with("exception.uiCtx.100401.content", "Check the username and password.")
        .with("exception.common.9000102.blob_storage.title", "Upload aborted")
        .with("exception.common.9000103.blob_storage.title", "Upload failed")
}

/// Prints notices through the selected output formatter.
struct ConsoleNotifier {
    format: OutputFormat,
}

#[async_trait]
impl INotifier for ConsoleNotifier {
    async fn notify(&self, notice: &Notice) -> anyhow::Result<()> {
        let fmt = get_formatter(self.format);
        match notice.kind {
            NoticeKind::UploadAdvice => {
                fmt.error(&notice.title);
                fmt.warn("The file was not stored. Retry the upload later.");
            }
            NoticeKind::Dialog | NoticeKind::Toast => {
                if notice.content.is_empty() || notice.content == notice.title {
                    fmt.error(&notice.title);
                } else {
                    fmt.error(&format!("{}: {}", notice.title, notice.content));
                }
            }
        }
        Ok(())
    }
}

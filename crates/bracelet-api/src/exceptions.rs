//! Exception messages and manager
//!
//! [`ExceptionMessages`] turns any error into an [`ExceptionAction`]: the
//! localized title and content to show, how to show them, whether to report
//! the failure, and which recovery to run. [`ExceptionManager`] carries the
//! action out through the [`IErrorReporter`], [`INotifier`] and
//! [`SessionControl`] ports.
//!
//! ## Message keys
//!
//! Text is looked up in an [`IMessageCatalog`] under `<key>.title` and
//! `<key>.content`, falling back to `exception.common.<code>.default` and
//! then to `exception.common.unknown`:
//!
//! | Failure | Key | Notice |
//! |---------|-----|--------|
//! | upload (`9000101..9000103`) | `exception.common.<code>.blob_storage` | upload advice |
//! | blob deletion (`9000104`) | common | none |
//! | login / password UI codes | `exception.uiCtx.<ui_code>` | toast |
//! | backend login codes | common | none |
//! | backend user codes | `exception.apiCtx.<api_code>` | dialog |
//! | backend patient codes | `exception.apiCtx.<api_code>` | toast |
//! | web-socket UI codes | `exception.ws.<api_code or ui_code>` | dialog |
//! | HTTP 401, expired session | common | none, forces logout |
//! | transport failure | `exception.common.network.<entity>` | dialog |
//! | anything else from this crate | `exception.common.<code>.<entity>` | dialog |
//!
//! Errors not raised by this crate are reported but never shown.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bracelet_api::exceptions::{ExceptionManager, TracingErrorReporter};
//! use bracelet_core::ports::StaticCatalog;
//!
//! # async fn example(err: bracelet_api::ApiError) {
//! let manager = ExceptionManager::new(
//!     Arc::new(StaticCatalog::new()),
//!     Arc::new(TracingErrorReporter),
//! );
//! let action = manager.manage_error(&err).await;
//! println!("{}: {}", action.title, action.content);
//! # }
//! ```

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use bracelet_core::domain::codes::{api as api_codes, blob as blob_codes, ui, HTTP_UNAUTHORIZED};
use bracelet_core::ports::{
    ErrorReport, IErrorReporter, IMessageCatalog, INotifier, Notice, NoticeKind, ReportLevel,
};

use crate::{ApiError, ErrorClass};

/// Title used when the catalog has no entry at all.
pub const UNKNOWN_TITLE: &str = "Unknown error";
/// Content used when the catalog has no entry at all.
pub const UNKNOWN_CONTENT: &str = "An unexpected error has occurred, please reload your page. \
If your problem persist contact to the support team.";

const UNKNOWN_KEY: &str = "exception.common.unknown";

/// Side-effecting recovery run after a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Close the session; the user must log in again
    ForceLogout,
}

/// Ends the session when a failure requires it.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn force_logout(&self);
}

// ============================================================================
// ExceptionAction
// ============================================================================

/// What to do about one failure
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionAction {
    pub class: ErrorClass,
    /// Display form of the error
    pub message: String,
    /// Rendered source chain below the error
    pub chain: Vec<String>,
    pub code: Option<u32>,
    pub entity: Option<String>,
    pub ui_code: Option<u32>,
    pub extra: Option<serde_json::Value>,
    /// Catalog key the texts were resolved from
    pub key: String,
    pub title: String,
    pub content: String,
    pub report: bool,
    pub level: ReportLevel,
    pub notice: Option<NoticeKind>,
    pub recovery: Option<Recovery>,
}

impl ExceptionAction {
    /// Notice to deliver, if the failure is shown to the user.
    pub fn notice(&self) -> Option<Notice> {
        self.notice
            .map(|kind| Notice::new(kind, self.title.clone(), self.content.clone()))
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport::new(&self.class.to_string(), &self.message, self.level)
            .with_code(self.code)
            .with_entity(self.entity.clone())
            .with_chain(self.chain.clone())
            .with_extra(self.extra.clone())
    }
}

// ============================================================================
// ExceptionMessages
// ============================================================================

/// Derives [`ExceptionAction`]s from errors
#[derive(Clone)]
pub struct ExceptionMessages {
    catalog: Arc<dyn IMessageCatalog>,
}

impl ExceptionMessages {
    pub fn new(catalog: Arc<dyn IMessageCatalog>) -> Self {
        Self { catalog }
    }

    /// Action for any error; the first [`ApiError`] in the source chain
    /// decides it.
    pub fn action_for(&self, error: &(dyn StdError + 'static)) -> ExceptionAction {
        let api_error = std::iter::successors(Some(error), |&e| e.source())
            .find_map(|e| e.downcast_ref::<ApiError>());
        match api_error {
            Some(api_error) => self.action_for_api(api_error),
            None => self.foreign(error),
        }
    }

    /// Action for an error raised by this crate.
    pub fn action_for_api(&self, err: &ApiError) -> ExceptionAction {
        let class = err.classification();
        let code = err.code();
        let ui_code = err.ui_code();
        let api_code = err.api_ctx().and_then(|c| c.code);
        let entity = err.entity().unwrap_or("generic");

        let code_segment = match class {
            ErrorClass::Network => Some("network".to_string()),
            _ => code.map(|c| c.to_string()),
        };
        let mut key = code_segment
            .as_ref()
            .map(|c| format!("exception.common.{c}.{entity}"))
            .unwrap_or_else(|| UNKNOWN_KEY.to_string());
        let default_key = code_segment.map(|c| format!("exception.common.{c}.default"));

        let mut notice = Some(NoticeKind::Dialog);
        let mut recovery = None;

        if is_in(blob_codes::UPLOAD, code) {
            notice = Some(NoticeKind::UploadAdvice);
        } else if is_in(blob_codes::DELETE, code) {
            notice = None;
        } else if let Some(ui_code) = ui_code.filter(|c| ui::LOGIN.contains(c) || ui::PASSWORD.contains(c)) {
            key = format!("exception.uiCtx.{ui_code}");
            notice = Some(NoticeKind::Toast);
        } else if is_in(api_codes::LOGIN, api_code) {
            notice = None;
        } else if let Some(api_code) = api_code.filter(|c| api_codes::USER.contains(c)) {
            key = format!("exception.apiCtx.{api_code}");
        } else if let Some(api_code) = api_code.filter(|c| api_codes::PATIENT.contains(c)) {
            key = format!("exception.apiCtx.{api_code}");
            notice = Some(NoticeKind::Toast);
        } else if let Some(ui_code) = ui_code.filter(|c| ui::WS.contains(c)) {
            key = format!("exception.ws.{}", api_code.unwrap_or(ui_code));
        } else if code == Some(HTTP_UNAUTHORIZED) || is_in(ui::SESSION, ui_code) {
            notice = None;
            recovery = Some(Recovery::ForceLogout);
        }

        let title = self.resolve(&key, default_key.as_deref(), "title", UNKNOWN_TITLE);
        // Toasts show the title when no dedicated content exists.
        let content = match notice {
            Some(NoticeKind::Toast) => self
                .catalog
                .lookup(&format!("{key}.content"))
                .unwrap_or_else(|| title.clone()),
            _ => self.resolve(&key, default_key.as_deref(), "content", UNKNOWN_CONTENT),
        };

        ExceptionAction {
            class,
            message: err.to_string(),
            chain: source_chain(err),
            code,
            entity: err.entity().map(str::to_string),
            ui_code,
            extra: err.extra_args(),
            key,
            title,
            content,
            report: true,
            level: ReportLevel::Error,
            notice,
            recovery,
        }
    }

    /// Errors from outside this crate: reported, never shown.
    fn foreign(&self, error: &(dyn StdError + 'static)) -> ExceptionAction {
        ExceptionAction {
            class: ErrorClass::Unclassified,
            message: error.to_string(),
            chain: source_chain(error),
            code: None,
            entity: None,
            ui_code: None,
            extra: None,
            key: UNKNOWN_KEY.to_string(),
            title: self.resolve(UNKNOWN_KEY, None, "title", UNKNOWN_TITLE),
            content: self.resolve(UNKNOWN_KEY, None, "content", UNKNOWN_CONTENT),
            report: true,
            level: ReportLevel::Error,
            notice: None,
            recovery: None,
        }
    }

    fn resolve(&self, key: &str, default_key: Option<&str>, field: &str, fallback: &str) -> String {
        self.catalog
            .lookup(&format!("{key}.{field}"))
            .or_else(|| default_key.and_then(|k| self.catalog.lookup(&format!("{k}.{field}"))))
            .or_else(|| self.catalog.lookup(&format!("{UNKNOWN_KEY}.{field}")))
            .unwrap_or_else(|| fallback.to_string())
    }
}

fn is_in(codes: &[u32], code: Option<u32>) -> bool {
    code.is_some_and(|c| codes.contains(&c))
}

fn source_chain(error: &(dyn StdError + 'static)) -> Vec<String> {
    std::iter::successors(error.source(), |&e| e.source())
        .map(|e| e.to_string())
        .collect()
}

// ============================================================================
// ExceptionManager
// ============================================================================

/// Reports, shows and recovers from failures
pub struct ExceptionManager {
    messages: ExceptionMessages,
    reporter: Arc<dyn IErrorReporter>,
    notifier: Option<Arc<dyn INotifier>>,
    session: Option<Arc<dyn SessionControl>>,
}

impl ExceptionManager {
    pub fn new(catalog: Arc<dyn IMessageCatalog>, reporter: Arc<dyn IErrorReporter>) -> Self {
        Self {
            messages: ExceptionMessages::new(catalog),
            reporter,
            notifier: None,
            session: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn INotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn SessionControl>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn messages(&self) -> &ExceptionMessages {
        &self.messages
    }

    /// Derives the action for `error` and carries it out.
    pub async fn manage_error(&self, error: &(dyn StdError + 'static)) -> ExceptionAction {
        let action = self.messages.action_for(error);
        self.manage(&action).await;
        action
    }

    /// Reports (or logs), notifies, then runs the recovery.
    ///
    /// Never fails: delivery problems are logged and dropped.
    pub async fn manage(&self, action: &ExceptionAction) {
        if action.report {
            if let Err(e) = self.reporter.report(&action.to_report()).await {
                warn!(error = %e, "Error report could not be delivered");
            }
        } else {
            log_unreported(action);
        }

        if let (Some(notice), Some(notifier)) = (action.notice(), &self.notifier) {
            if let Err(e) = notifier.notify(&notice).await {
                warn!(error = %e, "Notice could not be delivered");
            }
        }

        if action.recovery == Some(Recovery::ForceLogout) {
            if let Some(session) = &self.session {
                info!(code = ?action.code, "Closing session after authentication failure");
                session.force_logout().await;
            }
        }
    }
}

fn log_unreported(action: &ExceptionAction) {
    match action.level {
        ReportLevel::Fatal | ReportLevel::Error => {
            error!(code = ?action.code, entity = ?action.entity, "{}", action.message)
        }
        ReportLevel::Warning => warn!(code = ?action.code, "{}", action.message),
        ReportLevel::Log | ReportLevel::Info => info!(code = ?action.code, "{}", action.message),
        ReportLevel::Debug => debug!(code = ?action.code, "{}", action.message),
    }
}

/// Writes reports to the tracing pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

#[async_trait]
impl IErrorReporter for TracingErrorReporter {
    async fn report(&self, report: &ErrorReport) -> anyhow::Result<()> {
        error!(
            report_id = %report.id,
            level = %report.level,
            error_type = %report.error_type,
            code = ?report.code,
            entity = ?report.entity,
            chain = ?report.chain,
            extra = ?report.extra,
            "{}",
            report.message
        );
        Ok(())
    }
}

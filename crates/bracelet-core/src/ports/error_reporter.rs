//! Error reporting port (driven/secondary port)
//!
//! Failures worth an engineer's attention are turned into an [`ErrorReport`]
//! and handed to an external error-tracking sink. The default adapter writes
//! them to the tracing pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity attached to a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    Fatal,
    #[default]
    Error,
    Warning,
    Log,
    Info,
    Debug,
}

impl std::fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportLevel::Fatal => "fatal",
            ReportLevel::Error => "error",
            ReportLevel::Warning => "warning",
            ReportLevel::Log => "log",
            ReportLevel::Info => "info",
            ReportLevel::Debug => "debug",
        };
        write!(f, "{}", s)
    }
}

/// A structured, non-fatal error report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: String,
    pub timestamp: String,
    pub version: String,
    pub level: ReportLevel,
    /// Classification of the failure, e.g. `api` or `network`
    pub error_type: String,
    pub message: String,
    /// Numeric code (HTTP status, API or UI-context code) if any
    pub code: Option<u32>,
    /// Entity the failing operation acted on
    pub entity: Option<String>,
    /// Rendered source chain, outermost first
    pub chain: Vec<String>,
    /// Structured context attached by the failing operation
    pub extra: Option<serde_json::Value>,
}

impl ErrorReport {
    pub fn new(error_type: &str, message: &str, level: ReportLevel) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            level,
            error_type: error_type.to_string(),
            message: message.to_string(),
            code: None,
            entity: None,
            chain: Vec::new(),
            extra: None,
        }
    }

    pub fn with_code(mut self, code: Option<u32>) -> Self {
        self.code = code;
        self
    }

    pub fn with_entity(mut self, entity: Option<String>) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_extra(mut self, extra: Option<serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }
}

/// Port trait for an external error-tracking sink
#[async_trait::async_trait]
pub trait IErrorReporter: Send + Sync {
    /// Submits a report. Callers log and drop submission failures.
    async fn report(&self, report: &ErrorReport) -> anyhow::Result<()>;
}

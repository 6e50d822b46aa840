//! Bracelet API - REST data access for the Bracelet platform
//!
//! Provides async building blocks for:
//! - Typed CRUD against the platform REST API with query encoding
//! - OAuth session handling with transparent token refresh
//! - Chunked multipart uploads to blob storage through signed URLs
//! - Classification of failures into user-facing actions
//!
//! ## Modules
//!
//! - [`client`] - HTTP client: URL resolution, auth header injection, OAuth special cases
//! - [`fetch`] - Generic search/get/post/put/patch/delete with transformers
//! - [`controller`] - Per-entity facades over [`fetch::Fetch`]
//! - [`oauth`] - Token, check and revoke endpoints
//! - [`session`] - Token lifecycle and current user
//! - [`storage`] - Keyring and file backends for token persistence
//! - [`blob`] - Signed URLs and the multipart upload engine
//! - [`exceptions`] - Exception messages and manager

pub mod blob;
pub mod client;
pub mod controller;
pub mod exceptions;
pub mod fetch;
pub mod oauth;
pub mod session;
pub mod storage;
pub mod transformer;

use std::fmt;

use bracelet_core::domain::codes::{blob as blob_codes, ui};
use bracelet_core::domain::DomainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Entity name attached to blob storage failures.
pub const BLOB_STORAGE_ENTITY: &str = "blob_storage";

/// Structured error body returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiContext {
    pub code: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub loc: Option<serde_json::Value>,
    pub extra: Option<serde_json::Value>,
}

impl ApiContext {
    /// Parses an error body. `msg` wins over `detail` for the message.
    ///
    /// Returns `None` when the body is not a JSON object.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        let obj = value.as_object()?;

        let code = obj.get("code").and_then(|c| match c {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let message = obj
            .get("msg")
            .and_then(|m| m.as_str().map(str::to_string))
            .or_else(|| {
                obj.get("detail").map(|d| match d {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            });

        Some(Self {
            code,
            kind: obj.get("type").and_then(|t| t.as_str()).map(str::to_string),
            message,
            loc: obj.get("loc").cloned(),
            extra: obj.get("extra").cloned(),
        })
    }
}

/// Which of the two finalization calls of a multipart upload failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStage {
    Complete,
    Abort,
}

impl fmt::Display for FinalizeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeStage::Complete => write!(f, "completion"),
            FinalizeStage::Abort => write!(f, "abort"),
        }
    }
}

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request never produced an HTTP response
    Network,
    /// Raised by this crate without further refinement
    Platform,
    /// Carries a structured error body with a backend code
    ApiContext,
    /// Carries a locally assigned UI-context code
    UiContext,
    /// Internal failures not meant for the user
    Unclassified,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Network => "network",
            ErrorClass::Platform => "platform",
            ErrorClass::ApiContext => "api_context",
            ErrorClass::UiContext => "ui_context",
            ErrorClass::Unclassified => "unclassified",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised by REST, session and blob storage operations
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request failed before an HTTP response was received
    #[error("Network error: {source}")]
    Transport {
        entity: Option<String>,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status the operation does not accept
    #[error("HTTP {status} {reason}")]
    HttpStatus {
        status: u16,
        reason: String,
        entity: Option<String>,
        api_ctx: Option<ApiContext>,
    },

    /// No valid session token is available
    #[error("Invalid token")]
    InvalidToken,

    /// A failure re-signalled with a UI-context code
    #[error("{source}")]
    Session {
        ui_code: u32,
        #[source]
        source: Box<ApiError>,
    },

    /// A single part exhausted its attempts
    #[error("Upload of part {part_number} failed after {attempts} attempts")]
    UploadPart {
        part_number: u32,
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },

    /// The whole-file PUT of a single-shot upload failed
    #[error("Error during single file upload")]
    SimpleUpload {
        #[source]
        source: Box<ApiError>,
    },

    /// The completion or abort call of a multipart upload failed, or the
    /// upload was aborted because parts failed
    #[error("Multipart upload {stage} failed (aborted: {aborted}, failed parts: {failed_parts:?})")]
    MultipartFinalize {
        stage: FinalizeStage,
        aborted: bool,
        failed_parts: Vec<u32>,
        #[source]
        source: Option<Box<ApiError>>,
    },

    /// Removing a blob through its signed delete URL failed
    #[error("Error on remove file from blob storage")]
    BlobDelete {
        #[source]
        source: Box<ApiError>,
    },

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Token persistence failed
    #[error("Token storage error: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    /// Builds an [`ApiError::HttpStatus`] from a failed response, consuming
    /// its body to extract the structured error context.
    pub async fn from_response(response: reqwest::Response, entity: Option<&str>) -> Self {
        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let api_ctx = match response.bytes().await {
            Ok(body) => ApiContext::from_body(&body),
            Err(e) => {
                tracing::debug!(error = %e, "Could not read error body");
                None
            }
        };
        ApiError::HttpStatus {
            status: status.as_u16(),
            reason,
            entity: entity.map(str::to_string),
            api_ctx,
        }
    }

    pub fn transport(source: reqwest::Error, entity: Option<&str>) -> Self {
        ApiError::Transport {
            entity: entity.map(str::to_string),
            source,
        }
    }

    /// Wraps `self` with a UI-context code.
    pub fn with_ui_code(self, ui_code: u32) -> Self {
        ApiError::Session {
            ui_code,
            source: Box::new(self),
        }
    }

    pub fn classification(&self) -> ErrorClass {
        match self {
            ApiError::Transport { .. } => ErrorClass::Network,
            ApiError::Session { .. } => ErrorClass::UiContext,
            ApiError::HttpStatus {
                api_ctx: Some(ApiContext { code: Some(_), .. }),
                ..
            } => ErrorClass::ApiContext,
            ApiError::HttpStatus { .. }
            | ApiError::InvalidToken
            | ApiError::UploadPart { .. }
            | ApiError::SimpleUpload { .. }
            | ApiError::MultipartFinalize { .. }
            | ApiError::BlobDelete { .. } => ErrorClass::Platform,
            ApiError::InvalidResponse(_)
            | ApiError::Storage(_)
            | ApiError::Serialization(_)
            | ApiError::Domain(_) => ErrorClass::Unclassified,
        }
    }

    /// Primary code: HTTP status, UI or blob storage code.
    pub fn code(&self) -> Option<u32> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(u32::from(*status)),
            ApiError::InvalidToken => Some(ui::LOGIN_INVALID_CREDENTIALS),
            ApiError::Session { source, .. } => source.code(),
            ApiError::UploadPart { .. } => Some(blob_codes::ERROR_ON_FILE_UPLOAD),
            ApiError::SimpleUpload { .. } => Some(blob_codes::WRONG_SIMPLE_FILE_UPLOAD),
            ApiError::MultipartFinalize { .. } => Some(blob_codes::ABORTED_MULTIPART_FILE_UPLOAD),
            ApiError::BlobDelete { .. } => Some(blob_codes::ERROR_ON_FILE_DELETION),
            _ => None,
        }
    }

    /// Entity the failing operation acted on.
    pub fn entity(&self) -> Option<&str> {
        match self {
            ApiError::Transport { entity, .. } | ApiError::HttpStatus { entity, .. } => {
                entity.as_deref()
            }
            ApiError::InvalidToken => Some("oauth"),
            ApiError::Session { source, .. } => source.entity(),
            ApiError::UploadPart { .. }
            | ApiError::SimpleUpload { .. }
            | ApiError::MultipartFinalize { .. }
            | ApiError::BlobDelete { .. } => Some(BLOB_STORAGE_ENTITY),
            _ => None,
        }
    }

    /// HTTP status, looking through UI-context wrapping.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            ApiError::Session { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn ui_code(&self) -> Option<u32> {
        match self {
            ApiError::Session { ui_code, .. } => Some(*ui_code),
            _ => None,
        }
    }

    /// Structured backend error, looking through UI-context wrapping.
    pub fn api_ctx(&self) -> Option<&ApiContext> {
        match self {
            ApiError::HttpStatus { api_ctx, .. } => api_ctx.as_ref(),
            ApiError::Session { source, .. } => source.api_ctx(),
            _ => None,
        }
    }

    /// Short title for the failure.
    pub fn title(&self) -> String {
        match self {
            ApiError::HttpStatus { reason, status, .. } if reason.is_empty() => {
                format!("HTTP {status}")
            }
            ApiError::HttpStatus { reason, .. } => reason.clone(),
            ApiError::Transport { .. } => "Network error".to_string(),
            ApiError::InvalidToken => "Token".to_string(),
            ApiError::Session { source, .. } => source.title(),
            ApiError::UploadPart { .. } | ApiError::SimpleUpload { .. } => {
                "Error during file upload".to_string()
            }
            ApiError::MultipartFinalize { .. } => "Error during multipart file upload".to_string(),
            ApiError::BlobDelete { .. } => "Error on file deletion".to_string(),
            _ => "Unexpected error".to_string(),
        }
    }

    /// Structured context reported along with the error.
    pub fn extra_args(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::SimpleUpload { .. } => Some(serde_json::json!({
                "multipart": false,
                "rejected": true,
            })),
            ApiError::MultipartFinalize {
                stage,
                aborted,
                failed_parts,
                ..
            } => {
                let mut extra = serde_json::json!({
                    "multipart": true,
                    "completed": false,
                    "failed_parts": failed_parts,
                });
                if *stage == FinalizeStage::Abort {
                    extra["aborted"] = serde_json::Value::Bool(*aborted);
                }
                Some(extra)
            }
            ApiError::UploadPart {
                part_number,
                attempts,
                ..
            } => Some(serde_json::json!({
                "part_number": part_number,
                "attempts": attempts,
            })),
            ApiError::Session { source, .. } => source.extra_args(),
            _ => None,
        }
    }
}

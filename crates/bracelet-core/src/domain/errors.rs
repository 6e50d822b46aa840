//! Domain error types
//!
//! Errors raised while building or validating domain values: malformed
//! filter expressions, undecodable access tokens and invalid field values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Filter or sort expression that does not follow `field.OP:value`
    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    /// Access token whose payload segment cannot be decoded
    #[error("Invalid token format: {0}")]
    InvalidToken(String),

    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

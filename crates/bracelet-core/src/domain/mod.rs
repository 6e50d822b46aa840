//! Domain entities and business logic
//!
//! This module contains the core domain types of the platform client:
//! - Query parameter model and its string encoder
//! - OAuth token with decoded claims
//! - Platform entities (users, patients, studies, ...)
//! - Paginated list results
//! - Error codes and domain-specific error types

pub mod codes;
pub mod errors;
pub mod models;
pub mod paging;
pub mod query;
pub mod query_encoder;
pub mod token;

// Re-export commonly used types
pub use errors::DomainError;
pub use models::{
    Alarm, Chat, Instrument, Message, Pathology, PathologyLink, PasswordChange, Patient,
    PatientPathology, PatientPathologyMulti, Resource, SelectOption, Study, StudyDate,
    StudyDatesPage, User, UserPermission,
};
pub use paging::{RawPage, SearchResults};
pub use query::{
    ComparativeOp, EmbedSpec, FieldSpec, Filter, FilterTerm, FilterValue, LogicOperator,
    ParamKind, PlainParam, Projection, ProjectionItem, QueryParams, RawParam, Scalar,
    SortDirection, SortTerm,
};
pub use query_encoder::QueryEncoder;
pub use token::{OauthToken, TokenClaims, TokenRecord};

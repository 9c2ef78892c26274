//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An inbound frame was not a JSON object.
    #[error("response frame is not a JSON object")]
    NotAnObject,

    /// An inbound frame carried no usable `requestId`.
    #[error("response frame has no numeric requestId")]
    MissingCallId,

    /// The view mode name is not one of `all`, `favorites` or `filters`.
    #[error("unknown view mode: {0}")]
    UnknownViewMode(String),

    /// An identifier is invalid or empty.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

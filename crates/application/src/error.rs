//! Application error types

use postwhale_domain::{DomainError, RequestErrorKind};
use thiserror::Error;

use crate::ports::{BridgeError, StoreError};

/// Application-level errors.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A domain validation error occurred.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// A worker call failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// A preference store operation failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A worker result did not have the expected shape.
    #[error("invalid response for {action}: {message}")]
    Decode {
        /// Action whose result failed to decode.
        action: String,
        /// Decoder message.
        message: String,
    },

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl ApplicationError {
    /// Category used by the lifecycle state.
    #[must_use]
    pub const fn kind(&self) -> RequestErrorKind {
        match self {
            Self::Bridge(error) => error.kind(),
            Self::Decode { .. } => RequestErrorKind::InvalidResponse,
            Self::Domain(_) | Self::Store(_) | Self::NotFound(_) | Self::Cancelled => {
                RequestErrorKind::Unknown
            }
        }
    }
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

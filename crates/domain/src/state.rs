//! Request lifecycle states for UI binding.
//!
//! A target (an endpoint or saved request shown in the editor) moves through
//! `Idle -> Sending -> {Succeeded, Failed, Cancelled}` and back to `Sending`
//! on every resend.

use serde::{Deserialize, Serialize};

/// The phase of the most recent call issued for a target.
///
/// - `Idle`: nothing sent yet, show the Send button
/// - `Sending`: call in flight, show a spinner and Cancel
/// - `Succeeded`: the response panel shows the result
/// - `Failed`: show the error banner
/// - `Cancelled`: the user stopped waiting; earlier data stays visible
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    /// Nothing has been sent for this target.
    #[default]
    Idle,

    /// A call is in flight.
    Sending {
        /// When the call started, for elapsed-time display.
        #[serde(skip)]
        started_at: Option<std::time::Instant>,
    },

    /// The last call returned a result.
    Succeeded,

    /// The last call failed.
    Failed {
        /// Error category for display.
        kind: RequestErrorKind,
        /// Human-readable message.
        message: String,
    },

    /// The user cancelled the last call before it settled.
    Cancelled,
}

impl RequestState {
    /// Creates a `Sending` state stamped with the current instant.
    #[must_use]
    pub fn sending() -> Self {
        Self::Sending {
            started_at: Some(std::time::Instant::now()),
        }
    }

    /// Creates a `Failed` state.
    #[must_use]
    pub fn failed(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Returns true while a call is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Sending { .. })
    }

    /// Returns true once the state can no longer change without a resend.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. } | Self::Cancelled)
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Returns the elapsed time while sending.
    #[must_use]
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        match self {
            Self::Sending {
                started_at: Some(t),
            } => Some(t.elapsed()),
            _ => None,
        }
    }
}

/// Categories of call failures for user-friendly display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestErrorKind {
    /// No response arrived before the deadline.
    Timeout,

    /// The call could not be written to the worker.
    WorkerWriteFailure,

    /// The worker exited while the call was pending.
    WorkerTerminated,

    /// The worker answered with an error.
    Remote,

    /// The result could not be decoded into the expected type.
    InvalidResponse,

    /// Unknown or unexpected error.
    Unknown,
}

impl RequestErrorKind {
    /// Returns a short title for the error banner.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Timeout => "Request Timeout",
            Self::WorkerWriteFailure => "Backend Unreachable",
            Self::WorkerTerminated => "Backend Stopped",
            Self::Remote => "Backend Error",
            Self::InvalidResponse => "Invalid Response",
            Self::Unknown => "Error",
        }
    }

    /// Returns user-facing suggestions for this error type.
    #[must_use]
    pub const fn suggestions(&self) -> &[&'static str] {
        match self {
            Self::Timeout => &[
                "The backend did not answer within 30 seconds",
                "Check that the target service is reachable",
            ],
            Self::WorkerWriteFailure | Self::WorkerTerminated => &[
                "Restart the backend process",
                "Check the backend log output for a crash message",
            ],
            Self::Remote => &["Read the message returned by the backend"],
            Self::InvalidResponse => &["Backend and frontend versions may not match"],
            Self::Unknown => &[],
        }
    }
}

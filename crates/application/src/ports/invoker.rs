//! Action invoker port
//!
//! The one operation the rest of the application needs from the worker
//! bridge: send an action with a payload and await its decoded result.

use std::future::Future;
use std::sync::Arc;

use postwhale_domain::{CallId, RequestErrorKind};
use serde_json::Value;
use thiserror::Error;

/// Ways a call through the bridge can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// No response arrived before the deadline.
    #[error("request timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// The call frame could not be written to the worker.
    #[error("failed to write to worker: {0}")]
    WorkerWriteFailure(String),

    /// The worker exited or its output closed while the call was pending.
    #[error("worker process terminated")]
    WorkerTerminated,

    /// The worker reported a failure; the message is passed through verbatim.
    #[error("{0}")]
    RemoteError(String),

    /// A call id was registered twice.
    #[error("duplicate call id: {0}")]
    DuplicateCallId(CallId),
}

impl BridgeError {
    /// Category used by the lifecycle state.
    #[must_use]
    pub const fn kind(&self) -> RequestErrorKind {
        match self {
            Self::RequestTimeout { .. } => RequestErrorKind::Timeout,
            Self::WorkerWriteFailure(_) => RequestErrorKind::WorkerWriteFailure,
            Self::WorkerTerminated => RequestErrorKind::WorkerTerminated,
            Self::RemoteError(_) => RequestErrorKind::Remote,
            Self::DuplicateCallId(_) => RequestErrorKind::Unknown,
        }
    }
}

/// Port for issuing worker actions.
pub trait ActionInvoker: Send + Sync {
    /// Sends `action` with `data` and resolves with the worker's result.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] describing why the call did not succeed.
    fn invoke(
        &self,
        action: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, BridgeError>> + Send;
}

impl<T: ActionInvoker> ActionInvoker for Arc<T> {
    fn invoke(
        &self,
        action: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, BridgeError>> + Send {
        (**self).invoke(action, data)
    }
}

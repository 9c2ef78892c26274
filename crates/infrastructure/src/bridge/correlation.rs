//! Pending-call table.
//!
//! Every in-flight call owns one entry holding the sending half of a
//! oneshot channel and the abort handle of its deadline timer. Settling
//! always removes the entry under the table lock before sending, so of
//! response, timeout and drain whichever reaches the table first wins and
//! the rest find nothing to do.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use postwhale_application::BridgeError;
use postwhale_domain::CallId;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Final result delivered to a caller.
pub type CallOutcome = Result<Value, BridgeError>;

/// Sending half of a call's completion handle.
pub type CompletionHandle = oneshot::Sender<CallOutcome>;

struct PendingCall {
    handle: CompletionHandle,
    deadline: Instant,
    timeout: Duration,
    timer: AbortHandle,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<CallId, PendingCall>,
    closed: bool,
}

/// Calls awaiting a response from one worker generation.
#[derive(Default)]
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CorrelationTable")
            .field("pending", &state.entries.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl CorrelationTable {
    /// Creates an empty, open table.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a pending call and arms its deadline timer.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateCallId`] if `call_id` is already
    /// pending and [`BridgeError::WorkerTerminated`] if the table was
    /// drained. The handle is dropped in both cases.
    pub fn register(
        self: &Arc<Self>,
        call_id: CallId,
        handle: CompletionHandle,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        let deadline = Instant::now() + timeout;
        let table = Arc::downgrade(self);
        let timer = tokio::spawn(expire_at(table, call_id, deadline)).abort_handle();

        let mut state = self.state.lock();
        if state.closed {
            timer.abort();
            return Err(BridgeError::WorkerTerminated);
        }
        if state.entries.contains_key(&call_id) {
            timer.abort();
            drop(state);
            tracing::error!(%call_id, "Call id registered twice");
            return Err(BridgeError::DuplicateCallId(call_id));
        }

        state.entries.insert(
            call_id,
            PendingCall {
                handle,
                deadline,
                timeout,
                timer,
            },
        );
        Ok(())
    }

    /// Settles a pending call.
    ///
    /// Returns false if the call is unknown or already settled.
    pub fn resolve(&self, call_id: CallId, outcome: CallOutcome) -> bool {
        let Some(call) = self.state.lock().entries.remove(&call_id) else {
            tracing::debug!(%call_id, "No pending call for response");
            return false;
        };

        call.timer.abort();
        if call.handle.send(outcome).is_err() {
            tracing::trace!(%call_id, "Caller stopped waiting before settlement");
        }
        true
    }

    /// Settles a call with [`BridgeError::RequestTimeout`] if it is still
    /// pending.
    pub fn expire(&self, call_id: CallId) {
        let Some(call) = self.state.lock().entries.remove(&call_id) else {
            return;
        };

        let timeout_ms = u64::try_from(call.timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(%call_id, timeout_ms, "Call timed out");
        let _ = call.handle.send(Err(BridgeError::RequestTimeout { timeout_ms }));
    }

    /// Settles every pending call with `error` and closes the table.
    ///
    /// Returns how many calls were settled.
    pub fn drain_all(&self, error: &BridgeError) -> usize {
        let entries = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.entries)
        };

        let drained = entries.len();
        for (_, call) in entries {
            call.timer.abort();
            let _ = call.handle.send(Err(error.clone()));
        }
        drained
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Returns true once the table has been drained.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Earliest deadline among pending calls.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().entries.values().map(|call| call.deadline).min()
    }
}

async fn expire_at(table: Weak<CorrelationTable>, call_id: CallId, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;
    if let Some(table) = table.upgrade() {
        table.expire(call_id);
    }
}

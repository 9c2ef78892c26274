//! Per-target request lifecycle tracking.
//!
//! Each logical target (an endpoint or saved request open in the editor)
//! keeps only the outcome of its latest send. Every send is tagged with a
//! generation; a completion carrying an older generation than the entry's
//! current one is discarded, so a slow superseded call can never overwrite
//! a newer send's state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use postwhale_domain::RequestState;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::Clock;

/// The retained state of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEntry<R, V> {
    /// Last request sent for the target.
    pub request: Option<R>,
    /// Last successful response.
    pub response: Option<V>,
    /// Current phase.
    pub state: RequestState,
    /// Generation of the latest send.
    pub generation: u64,
    /// When the entry last changed.
    pub updated_at: DateTime<Utc>,
}

impl<R, V> LifecycleEntry<R, V> {
    /// Returns true while the latest send is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.state.is_loading()
    }
}

/// Handle for one send, returned by [`RequestLifecycleStore::begin`].
#[derive(Debug, Clone)]
pub struct SendTicket {
    target: String,
    generation: u64,
    token: CancellationToken,
}

impl SendTicket {
    /// Target the send belongs to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Generation of the send.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Fires when the send is cancelled or superseded.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
}

struct Slot<R, V> {
    entry: LifecycleEntry<R, V>,
    token: CancellationToken,
}

/// Thread-safe lifecycle store keyed by target id.
pub struct RequestLifecycleStore<R, V, C> {
    slots: Arc<RwLock<HashMap<String, Slot<R, V>>>>,
    generations: AtomicU64,
    clock: C,
}

impl<R, V, C> RequestLifecycleStore<R, V, C>
where
    R: Clone + Send + Sync,
    V: Clone + Send + Sync,
    C: Clock,
{
    /// Creates an empty store.
    pub fn new(clock: C) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            generations: AtomicU64::new(0),
            clock,
        }
    }

    /// Marks `target` as sending `request`.
    ///
    /// Any send still in flight for the target is superseded: its
    /// cancellation token fires and its completion will be ignored. The
    /// previous response stays visible until the new one lands.
    pub async fn begin(&self, target: impl Into<String>, request: R) -> SendTicket {
        let target = target.into();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let now = self.clock.now();

        let mut slots = self.slots.write().await;
        match slots.get_mut(&target) {
            Some(slot) => {
                slot.token.cancel();
                slot.token = token.clone();
                slot.entry.request = Some(request);
                slot.entry.state = RequestState::sending();
                slot.entry.generation = generation;
                slot.entry.updated_at = now;
            }
            None => {
                slots.insert(
                    target.clone(),
                    Slot {
                        entry: LifecycleEntry {
                            request: Some(request),
                            response: None,
                            state: RequestState::sending(),
                            generation,
                            updated_at: now,
                        },
                        token: token.clone(),
                    },
                );
            }
        }
        drop(slots);

        tracing::debug!(target_id = %target, generation, "Send started");

        SendTicket {
            target,
            generation,
            token,
        }
    }

    /// Records the outcome of the send identified by `ticket`.
    ///
    /// Returns false, leaving the entry untouched, when the send was
    /// cancelled or superseded by a newer one.
    pub async fn complete(&self, ticket: &SendTicket, outcome: Result<&V, &ApplicationError>) -> bool {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;

        let Some(slot) = slots.get_mut(&ticket.target) else {
            return false;
        };
        if slot.entry.generation != ticket.generation || !slot.entry.is_loading() {
            tracing::debug!(
                target_id = %ticket.target,
                generation = ticket.generation,
                current = slot.entry.generation,
                "Discarding stale completion"
            );
            return false;
        }

        match outcome {
            Ok(response) => {
                slot.entry.response = Some(response.clone());
                slot.entry.state = RequestState::Succeeded;
            }
            Err(error) => {
                slot.entry.response = None;
                slot.entry.state = RequestState::failed(error.kind(), error.to_string());
            }
        }
        slot.entry.updated_at = now;
        true
    }

    /// Stops treating the target's latest send as in flight.
    ///
    /// The request and response fields are kept. Returns false if nothing
    /// was loading.
    pub async fn cancel(&self, target: &str) -> bool {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;

        let Some(slot) = slots.get_mut(target) else {
            return false;
        };
        if !slot.entry.is_loading() {
            return false;
        }

        slot.token.cancel();
        slot.entry.state = RequestState::Cancelled;
        slot.entry.updated_at = now;
        drop(slots);

        tracing::debug!(target_id = %target, "Send cancelled");
        true
    }

    /// Sends `request` for `target`, awaiting `call` unless cancelled first.
    ///
    /// Cancelling stops the wait only; whatever `call` was driving is
    /// dropped and its bridge entry is cleaned up by its own timer.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Cancelled`] if the send was cancelled or
    /// superseded, even when `call` finished in the same poll, otherwise the
    /// error produced by `call`.
    pub async fn send<F>(&self, target: impl Into<String>, request: R, call: F) -> ApplicationResult<V>
    where
        F: Future<Output = ApplicationResult<V>> + Send,
    {
        let ticket = self.begin(target, request).await;
        let token = ticket.cancellation();

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ApplicationError::Cancelled),
            outcome = call => outcome,
        };

        if !self.complete(&ticket, outcome.as_ref()).await {
            return Err(ApplicationError::Cancelled);
        }
        outcome
    }

    /// Returns a copy of the target's entry.
    pub async fn get(&self, target: &str) -> Option<LifecycleEntry<R, V>> {
        let slots = self.slots.read().await;
        slots.get(target).map(|slot| slot.entry.clone())
    }

    /// Returns true while the target has a send in flight.
    pub async fn is_loading(&self, target: &str) -> bool {
        let slots = self.slots.read().await;
        slots.get(target).is_some_and(|slot| slot.entry.is_loading())
    }

    /// Forgets a target, cancelling its in-flight send.
    pub async fn remove(&self, target: &str) -> Option<LifecycleEntry<R, V>> {
        let mut slots = self.slots.write().await;
        slots.remove(target).map(|slot| {
            slot.token.cancel();
            slot.entry
        })
    }

    /// Number of tracked targets.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Returns true if no target is tracked.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

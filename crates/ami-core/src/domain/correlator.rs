//! Pending-call table: matches responses back to the action that asked.
//!
//! Each sent action registers a one-shot continuation under its
//! [`ActionId`].  When a response carrying that identifier is processed, the
//! entry is removed and the continuation runs exactly once.  Matching is by
//! the identifier present on the response only.
//!
//! The table is shared between the sending side and the reading side of a
//! connection, so it sits behind a mutex.  Continuations always run after the
//! lock has been released, which lets a continuation send a follow-up action
//! without deadlocking.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::protocol::{ActionId, ResponseMessage};

/// Why a pending call ended without a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The connection failed while the call was pending.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The connection was closed locally while the call was pending.
    #[error("connection closed")]
    ConnectionClosed,
}

/// What a continuation receives.
pub type CallOutcome = Result<ResponseMessage, CallError>;

/// A one-shot callback run with the outcome of a call.
pub type Continuation = Box<dyn FnOnce(CallOutcome) + Send + 'static>;

/// Errors raised when registering a continuation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// Another call with the same identifier is still pending.
    #[error("ActionID {0} is already pending")]
    DuplicateActionId(ActionId),
}

/// Table of pending continuations keyed by action identifier.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<ActionId, Continuation>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `continuation` until a response for `id` arrives.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateActionId`] if `id` is already
    /// pending.  The existing entry is left untouched.
    pub fn register(
        &self,
        id: ActionId,
        continuation: Continuation,
    ) -> Result<(), CorrelationError> {
        let mut pending = self.lock();
        if pending.contains_key(&id) {
            return Err(CorrelationError::DuplicateActionId(id));
        }
        pending.insert(id, continuation);
        Ok(())
    }

    /// Hands `response` to the continuation registered under its
    /// `ActionID`.
    ///
    /// Returns `false` when the response carries no identifier or nothing is
    /// pending under it; the caller decides how to report the orphan.
    pub fn resolve(&self, response: ResponseMessage) -> bool {
        let Some(id) = response.action_id() else {
            return false;
        };
        let continuation = self.lock().remove(id);
        match continuation {
            Some(continuation) => {
                debug!(action_id = id, "resolving pending call");
                continuation(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without running it.  Returns `true` if
    /// something was pending.
    pub fn cancel(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Fails every pending call with `error` and empties the table.
    ///
    /// Returns the number of continuations notified.
    pub fn fail_all(&self, error: CallError) -> usize {
        let drained: Vec<(ActionId, Continuation)> = self.lock().drain().collect();
        let count = drained.len();
        for (id, continuation) in drained {
            debug!(action_id = %id, %error, "failing pending call");
            continuation(Err(error.clone()));
        }
        count
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    // A continuation panicking outside the lock cannot leave the map
    // half-updated, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<ActionId, Continuation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

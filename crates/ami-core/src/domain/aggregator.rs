//! Folding of list responses and their child events into one answer.
//!
//! A list action is answered by a head response (`EventList: start`),
//! one event per item and a closing event.  The aggregator keeps each open
//! head under its `ActionID`, appends child events carrying the same
//! identifier, and hands the finished response back once a child closes the
//! list.  Events belonging to no open list are returned untouched for
//! dispatch.
//!
//! The aggregator holds the only link from identifier to open response;
//! events never point back at their parent.  It is owned by the single reader
//! of a connection and needs no locking.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::protocol::{EventMessage, ResponseMessage};

/// Result of offering an event to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// The event was appended to an open list that is still incomplete.
    Absorbed,
    /// The event closed its list; the finished response is returned.
    Completed(ResponseMessage),
    /// No open list claims the event.
    Unclaimed(EventMessage),
}

/// Open list responses keyed by `ActionID`.
#[derive(Debug, Default)]
pub struct ListAggregator {
    open: HashMap<String, ResponseMessage>,
}

impl ListAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts collecting events for the list headed by `response`.
    ///
    /// A list already open under the same identifier is replaced.
    ///
    /// # Errors
    ///
    /// Returns the response back when it carries no `ActionID`, since no
    /// child event could ever be matched to it.
    pub fn open(&mut self, response: ResponseMessage) -> Result<(), ResponseMessage> {
        let Some(id) = response.action_id().map(str::to_string) else {
            return Err(response);
        };
        debug!(action_id = %id, "list opened");
        if let Some(previous) = self.open.insert(id.clone(), response) {
            warn!(
                action_id = %id,
                events = previous.events().len(),
                "replacing unfinished list with the same ActionID"
            );
        }
        Ok(())
    }

    /// Offers an event to the open list with the event's `ActionID`.
    pub fn offer(&mut self, event: EventMessage) -> Offer {
        let Some(id) = event.action_id().map(str::to_string) else {
            return Offer::Unclaimed(event);
        };
        let Some(response) = self.open.get_mut(&id) else {
            return Offer::Unclaimed(event);
        };

        response.add_event(event);
        if !response.is_complete() {
            return Offer::Absorbed;
        }
        match self.open.remove(&id) {
            Some(response) => {
                debug!(action_id = %id, events = response.events().len(), "list completed");
                Offer::Completed(response)
            }
            None => Offer::Absorbed,
        }
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.open.contains_key(id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Drops the open list for `id`, returning what was collected so far.
    pub fn abandon(&mut self, id: &str) -> Option<ResponseMessage> {
        self.open.remove(id)
    }

    /// Drops every open list.
    pub fn abandon_all(&mut self) -> Vec<ResponseMessage> {
        self.open.drain().map(|(_, response)| response).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Event fan-out to registered listeners.
//!
//! Listeners come in three shapes: a closure, a method on a shared object,
//! or an object implementing [`EventSink`].  All three are adapted to
//! `EventSink` when the [`Listener`] is built, so dispatch is a plain loop
//! over trait objects.
//!
//! Listeners run in registration order.  A listener that returns an error or
//! panics is logged and skipped; the remaining listeners still see the event.
//! The registry lock is only held to take a snapshot, so listeners may
//! register or unregister listeners while being dispatched to.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::sequence::{ListenerId, SequenceCounter};
use crate::protocol::EventMessage;

/// Failure reported by a listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Something that consumes events.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &EventMessage) -> Result<(), ListenerError>;
}

/// Filter evaluated before a listener is invoked.
pub type EventPredicate = Box<dyn Fn(&EventMessage) -> bool + Send + Sync>;

struct FnSink<F>(F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&EventMessage) -> Result<(), ListenerError> + Send + Sync,
{
    fn handle(&self, event: &EventMessage) -> Result<(), ListenerError> {
        (self.0)(event)
    }
}

struct MethodSink<T> {
    target: Arc<T>,
    method: fn(&T, &EventMessage) -> Result<(), ListenerError>,
}

impl<T: Send + Sync> EventSink for MethodSink<T> {
    fn handle(&self, event: &EventMessage) -> Result<(), ListenerError> {
        (self.method)(&self.target, event)
    }
}

/// A sink plus an optional filter.
pub struct Listener {
    sink: Arc<dyn EventSink>,
    predicate: Option<EventPredicate>,
}

impl Listener {
    /// Wraps a closure.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ami_core::domain::{Dispatcher, Listener};
    /// use ami_core::protocol::EventMessage;
    ///
    /// let dispatcher = Dispatcher::new();
    /// dispatcher.register(
    ///     Listener::from_fn(|event: &EventMessage| {
    ///         println!("{}", event.name());
    ///         Ok(())
    ///     })
    ///     .for_events(["Hangup"]),
    /// );
    /// let report = dispatcher.dispatch(&EventMessage::parse("Event: Hangup"));
    /// assert_eq!(report.delivered, 1);
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&EventMessage) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self::from_sink(Arc::new(FnSink(f)))
    }

    /// Wraps a method of a shared object, e.g. `Listener::from_method(stats,
    /// Stats::on_event)`.
    pub fn from_method<T>(
        target: Arc<T>,
        method: fn(&T, &EventMessage) -> Result<(), ListenerError>,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::from_sink(Arc::new(MethodSink { target, method }))
    }

    /// Wraps an [`EventSink`] object.
    pub fn from_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            predicate: None,
        }
    }

    /// Adds a filter.  Combined with any existing filter, both must accept.
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&EventMessage) -> bool + Send + Sync + 'static,
    {
        let combined: EventPredicate = match self.predicate.take() {
            Some(existing) => {
                Box::new(move |event: &EventMessage| existing(event) && predicate(event))
            }
            None => Box::new(predicate),
        };
        self.predicate = Some(combined);
        self
    }

    /// Restricts the listener to events with one of `names`, compared
    /// case-insensitively.  An empty set accepts every event.
    pub fn for_events<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: HashSet<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_ascii_lowercase())
            .collect();
        if names.is_empty() {
            return self;
        }
        self.with_predicate(move |event| names.contains(&event.name().to_ascii_lowercase()))
    }

    fn accepts(&self, event: &EventMessage) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(event))
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}

/// Counts from one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Ordered listener registry.
#[derive(Debug, Default)]
pub struct Dispatcher {
    ids: SequenceCounter,
    listeners: Mutex<Vec<(ListenerId, Arc<Listener>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` and returns its handle.
    pub fn register(&self, listener: Listener) -> ListenerId {
        let id = self.ids.next_id();
        self.lock().push((id, Arc::new(listener)));
        debug!(listener = %id, "listener registered");
        id
    }

    /// Removes the listener.  Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        before != listeners.len()
    }

    /// Delivers `event` to every accepting listener, in registration order.
    pub fn dispatch(&self, event: &EventMessage) -> DispatchReport {
        let snapshot: Vec<(ListenerId, Arc<Listener>)> = self.lock().clone();
        let mut report = DispatchReport::default();

        for (id, listener) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if listener.accepts(event) {
                    Some(listener.sink.handle(event))
                } else {
                    None
                }
            }));
            match outcome {
                Ok(None) => report.skipped += 1,
                Ok(Some(Ok(()))) => report.delivered += 1,
                Ok(Some(Err(e))) => {
                    warn!(listener = %id, event = event.name(), error = %e, "listener failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(listener = %id, event = event.name(), "listener panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<Listener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn hangup() -> EventMessage {
        EventMessage::parse("Event: Hangup\r\nChannel: SIP/1")
    }

    #[derive(Default)]
    struct Counter {
        seen: Mutex<Vec<String>>,
    }

    impl Counter {
        fn on_event(&self, event: &EventMessage) -> Result<(), ListenerError> {
            self.seen.lock().unwrap().push(event.name().to_string());
            Ok(())
        }
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        // Arrange
        let order = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            dispatcher.register(Listener::from_fn(move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            }));
        }

        // Act
        let report = dispatcher.dispatch(&hangup());

        // Assert
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(report.delivered, 3);
    }

    #[test]
    fn test_failing_and_panicking_listeners_do_not_stop_dispatch() {
        // Arrange
        let dispatcher = Dispatcher::new();
        dispatcher.register(Listener::from_fn(|_| Err(ListenerError::new("boom"))));
        dispatcher.register(Listener::from_fn(|_| panic!("listener bug")));
        let counter = Arc::new(Counter::default());
        dispatcher.register(Listener::from_method(Arc::clone(&counter), Counter::on_event));

        // Act
        let report = dispatcher.dispatch(&hangup());

        // Assert
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(*counter.seen.lock().unwrap(), vec!["Hangup"]);
    }

    #[test]
    fn test_rejecting_predicate_skips_but_keeps_listener() {
        // Arrange
        let dispatcher = Dispatcher::new();
        let counter = Arc::new(Counter::default());
        dispatcher.register(
            Listener::from_method(Arc::clone(&counter), Counter::on_event)
                .with_predicate(|event| event.channel() == Some("SIP/2")),
        );

        // Act
        let skipped = dispatcher.dispatch(&hangup());
        let delivered =
            dispatcher.dispatch(&EventMessage::parse("Event: Hangup\r\nChannel: SIP/2"));

        // Assert
        assert_eq!(skipped.skipped, 1);
        assert_eq!(delivered.delivered, 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_for_events_filters_by_name_and_empty_set_accepts_all() {
        // Arrange
        let dispatcher = Dispatcher::new();
        let only_dial = Arc::new(Counter::default());
        let everything = Arc::new(Counter::default());
        dispatcher.register(
            Listener::from_method(Arc::clone(&only_dial), Counter::on_event)
                .for_events(["dialbegin"]),
        );
        dispatcher.register(
            Listener::from_method(Arc::clone(&everything), Counter::on_event)
                .for_events(Vec::<String>::new()),
        );

        // Act
        dispatcher.dispatch(&hangup());
        dispatcher.dispatch(&EventMessage::parse("Event: DialBegin"));

        // Assert
        assert_eq!(*only_dial.seen.lock().unwrap(), vec!["DialBegin"]);
        assert_eq!(everything.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_sink_object_receives_events() {
        // Arrange
        let mut sink = MockEventSink::new();
        sink.expect_handle()
            .with(always())
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = Dispatcher::new();
        dispatcher.register(Listener::from_sink(Arc::new(sink)));

        // Act
        let report = dispatcher.dispatch(&hangup());

        // Assert
        assert_eq!(report.delivered, 1);
    }

    #[test]
    fn test_unregister_removes_only_that_listener() {
        // Arrange
        let dispatcher = Dispatcher::new();
        let first = dispatcher.register(Listener::from_fn(|_| Ok(())));
        let second = dispatcher.register(Listener::from_fn(|_| Ok(())));

        // Act
        let removed = dispatcher.unregister(first);
        let removed_again = dispatcher.unregister(first);

        // Assert
        assert!(removed);
        assert!(!removed_again);
        assert_eq!(dispatcher.len(), 1);
        assert!(dispatcher.unregister(second));
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_listener_may_unregister_itself_during_dispatch() {
        // Arrange
        let dispatcher = Arc::new(Dispatcher::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::default();
        let (inner, inner_slot) = (Arc::clone(&dispatcher), Arc::clone(&slot));
        let id = dispatcher.register(Listener::from_fn(move |_| {
            if let Some(id) = *inner_slot.lock().unwrap() {
                inner.unregister(id);
            }
            Ok(())
        }));
        *slot.lock().unwrap() = Some(id);

        // Act
        let report = dispatcher.dispatch(&hangup());

        // Assert
        assert_eq!(report.delivered, 1);
        assert!(dispatcher.is_empty());
    }
}

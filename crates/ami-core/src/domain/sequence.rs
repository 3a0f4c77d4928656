//! Lock-free counter handing out listener identifiers.
//!
//! Identifiers are never reused within one dispatcher, so a stale
//! [`ListenerId`] held by a caller can never unregister a listener that was
//! registered after it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A monotonically increasing source of [`ListenerId`]s, starting at 1.
///
/// `Ordering::Relaxed` is enough: the ids only need to be unique, they do not
/// publish any other memory.
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns a fresh identifier.
    pub fn next_id(&self) -> ListenerId {
        ListenerId(self.inner.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        self.inner.load(Ordering::Relaxed) - 1
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_id_is_one() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next_id().value(), 1);
        assert_eq!(counter.issued(), 1);
    }

    #[test]
    fn test_ids_are_unique_across_threads() {
        // Arrange
        let counter = Arc::new(SequenceCounter::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..250).map(|_| c.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let ids: HashSet<ListenerId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        assert_eq!(ids.len(), 1000);
        assert_eq!(counter.issued(), 1000);
    }

    #[test]
    fn test_display_is_prefixed() {
        let counter = SequenceCounter::default();
        assert_eq!(counter.next_id().to_string(), "listener-1");
    }
}

//! # Work Queue Capability
//!
//! Queue-driven workers drain an injected queue rather than a hardcoded one.
//! A queue must be safe for many concurrent producers and one consumer; it
//! may be bounded, unbounded or ordered by priority.

/// A multi-producer / single-consumer queue of work items.
///
/// Invariant: the number of items held equals pushed minus popped, and no
/// item is returned by `try_pop` twice.
pub trait WorkQueue<T>: Send + Sync {
    /// Adds an item, or hands it back when the queue rejects it (full).
    fn try_push(&self, item: T) -> Result<(), T>;

    /// Removes the next item, if any.
    fn try_pop(&self) -> Option<T>;

    /// Number of items currently queued (snapshot in time).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items, or `None` when unbounded.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

/// A queue that can copy out its contents without dequeuing them.
pub trait SnapshotQueue<T: Clone>: WorkQueue<T> {
    /// Point-in-time copy of the queued items, in the order they would be
    /// popped.
    fn snapshot(&self) -> Vec<T>;
}

use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use foreman_api::{SnapshotQueue, WorkQueue};

/// Max-heap queue: the greatest item by `Ord` is popped first.
///
/// Items of equal priority are not guaranteed to pop in insertion order.
/// Under `DropOldest` backpressure the evicted item is the one that would
/// have been popped next.
pub struct PriorityQueue<T> {
    items: Mutex<BinaryHeap<T>>,
    capacity: Option<usize>,
}

impl<T: Ord> PriorityQueue<T> {
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(BinaryHeap::new()),
            capacity: None,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(BinaryHeap::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    fn items(&self) -> MutexGuard<'_, BinaryHeap<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Ord> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T: Ord + Send> WorkQueue<T> for PriorityQueue<T> {
    fn try_push(&self, item: T) -> Result<(), T> {
        let mut items = self.items();
        if self.capacity.is_some_and(|capacity| items.len() >= capacity) {
            return Err(item);
        }
        items.push(item);
        Ok(())
    }

    fn try_pop(&self) -> Option<T> {
        self.items().pop()
    }

    fn len(&self) -> usize {
        self.items().len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<T: Ord + Send + Clone> SnapshotQueue<T> for PriorityQueue<T> {
    fn snapshot(&self) -> Vec<T> {
        let mut sorted = self.items().clone().into_sorted_vec();
        sorted.reverse();
        sorted
    }
}

impl<T: Ord> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.items().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

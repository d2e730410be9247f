use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use foreman_api::{SnapshotQueue, WorkQueue};

/// First-in first-out queue, optionally bounded.
///
/// Lock-based, which is what allows [`SnapshotQueue::snapshot`].
pub struct FifoQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
}

impl<T> FifoQueue<T> {
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: None,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> FromIterator<T> for FifoQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: Mutex::new(iter.into_iter().collect()),
            capacity: None,
        }
    }
}

impl<T: Send> WorkQueue<T> for FifoQueue<T> {
    fn try_push(&self, item: T) -> Result<(), T> {
        let mut items = self.items();
        if self.capacity.is_some_and(|capacity| items.len() >= capacity) {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }

    fn try_pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    fn len(&self) -> usize {
        self.items().len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<T: Send + Clone> SnapshotQueue<T> for FifoQueue<T> {
    fn snapshot(&self) -> Vec<T> {
        self.items().iter().cloned().collect()
    }
}

impl<T> fmt::Debug for FifoQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoQueue")
            .field("len", &self.items().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

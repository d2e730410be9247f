//! Lock-free queues backed by `crossbeam-queue`.
//!
//! These trade the snapshot capability for lock-free push and pop; they do
//! not implement `SnapshotQueue`.

use std::fmt;

use crossbeam_queue::{ArrayQueue, SegQueue};
use foreman_api::WorkQueue;

/// Unbounded lock-free FIFO queue.
pub struct SegmentQueue<T> {
    items: SegQueue<T>,
}

impl<T> SegmentQueue<T> {
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
        }
    }
}

impl<T> Default for SegmentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> WorkQueue<T> for SegmentQueue<T> {
    fn try_push(&self, item: T) -> Result<(), T> {
        self.items.push(item);
        Ok(())
    }

    fn try_pop(&self) -> Option<T> {
        self.items.pop()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> fmt::Debug for SegmentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentQueue")
            .field("len", &self.items.len())
            .finish()
    }
}

/// Bounded lock-free FIFO queue with a fixed-size ring of slots.
pub struct RingQueue<T> {
    items: ArrayQueue<T>,
}

impl<T> RingQueue<T> {
    /// Panics if `capacity` is zero, like the underlying `ArrayQueue`.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity),
        }
    }
}

impl<T: Send> WorkQueue<T> for RingQueue<T> {
    fn try_push(&self, item: T) -> Result<(), T> {
        self.items.push(item)
    }

    fn try_pop(&self) -> Option<T> {
        self.items.pop()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.items.capacity())
    }
}

impl<T> fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("len", &self.items.len())
            .field("capacity", &self.items.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ring_queue_rejects_when_full() {
        let queue = RingQueue::new(2);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert_eq!(queue.try_push(3), Err(3));
        assert_eq!(WorkQueue::capacity(&queue), Some(2));
        assert_eq!(queue.try_pop(), Some(1));
    }

    #[test]
    fn segment_queue_counts_concurrent_pushes() {
        let queue = Arc::new(SegmentQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.try_push(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(queue.len(), 1000);
        let mut drained = Vec::new();
        while let Some(item) = queue.try_pop() {
            drained.push(item);
        }
        drained.sort_unstable();
        drained.dedup();
        assert_eq!(drained.len(), 1000);
    }
}

//! Queue-driven workers.
//!
//! A [`QueueWorker`] drains a multi-producer queue on its own thread, one
//! item per iteration. Producers hand items over through [`QueueWorker::enqueue`]
//! or a clonable [`QueueSender`]; each push sets the worker's signal so an
//! idle worker wakes immediately instead of waiting out its safety poll.
//!
//! The queue itself is injected through [`WorkQueue`]. The crate ships
//! [`FifoQueue`], [`PriorityQueue`] and the lock-free [`SegmentQueue`] and
//! [`RingQueue`].

pub mod fifo;
pub mod lockfree;
pub mod priority;

pub use fifo::FifoQueue;
pub use lockfree::{RingQueue, SegmentQueue};
pub use priority::PriorityQueue;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use foreman_api::{
    Lifecycle, QueueError, SnapshotQueue, WorkQueue, WorkerError, WorkerListener, WorkerState,
};
use tracing::debug;

use crate::config::{BackpressureStrategy, QueueConfig, WorkerConfig};
use crate::event::EventWorker;
use crate::signal::Signal;
use crate::worker::{Hook, ItemFailure, Routine, WorkContext, WorkResult};

const FLUSH_POLL: Duration = Duration::from_millis(1);

/// Processes one dequeued item on the worker thread.
///
/// Closures `FnMut(&T) -> anyhow::Result<()>` implement this directly.
pub trait ItemHandler<T>: Send + 'static {
    fn handle(&mut self, item: &T, ctx: &WorkContext) -> anyhow::Result<()>;

    /// Hook fired by a forced `stop` while an item is being handled.
    fn interrupt_hook(&self) -> Option<Hook> {
        None
    }
}

impl<T, F> ItemHandler<T> for F
where
    F: FnMut(&T) -> anyhow::Result<()> + Send + 'static,
{
    fn handle(&mut self, item: &T, _ctx: &WorkContext) -> anyhow::Result<()> {
        self(item)
    }
}

/// Routine that pops one item per iteration and hands it to a handler.
pub struct Drain<T, H, Q> {
    queue: Arc<Q>,
    handler: H,
    _items: PhantomData<fn() -> T>,
}

impl<T, H, Q> Drain<T, H, Q> {
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<T, H, Q> Routine for Drain<T, H, Q>
where
    T: Send + 'static,
    H: ItemHandler<T>,
    Q: WorkQueue<T> + 'static,
{
    type Item = T;

    fn has_work(&mut self) -> bool {
        !self.queue.is_empty()
    }

    fn work(&mut self, ctx: &WorkContext) -> WorkResult<T> {
        let Some(item) = self.queue.try_pop() else {
            return Ok(None);
        };
        match self.handler.handle(&item, ctx) {
            Ok(()) => Ok(Some(item)),
            Err(error) => Err(ItemFailure {
                item: Some(item),
                error,
            }),
        }
    }

    fn interrupt_hook(&self) -> Option<Hook> {
        self.handler.interrupt_hook()
    }
}

/// Producer handle for a queue worker.
///
/// Cheap to clone; every clone pushes into the same queue and wakes the same
/// worker.
pub struct QueueSender<T, Q> {
    queue: Arc<Q>,
    signal: Signal,
    config: QueueConfig,
    _items: PhantomData<fn(T)>,
}

impl<T, Q> Clone for QueueSender<T, Q> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            signal: self.signal.clone(),
            config: self.config.clone(),
            _items: PhantomData,
        }
    }
}

impl<T, Q> QueueSender<T, Q>
where
    T: Send,
    Q: WorkQueue<T>,
{
    /// Pushes one item and wakes the worker.
    ///
    /// A full bounded queue is handled according to the configured
    /// [`BackpressureStrategy`]. `Block` waits for room with no upper bound,
    /// so it only returns once the worker has drained something.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut item = item;
        loop {
            match self.queue.try_push(item) {
                Ok(()) => {
                    self.signal.set();
                    return Ok(());
                }
                Err(rejected) => item = rejected,
            }

            match self.config.backpressure {
                BackpressureStrategy::Block => {
                    self.signal.set();
                    thread::sleep(self.config.retry_interval);
                }
                BackpressureStrategy::Error => {
                    return Err(QueueError::Full {
                        capacity: self.queue.capacity().unwrap_or_else(|| self.queue.len()),
                    });
                }
                BackpressureStrategy::DropNewest => {
                    debug!(len = self.queue.len(), "queue full, dropping newest item");
                    self.signal.set();
                    return Ok(());
                }
                BackpressureStrategy::DropOldest => {
                    if self.queue.try_pop().is_some() {
                        debug!(len = self.queue.len(), "queue full, dropped oldest item");
                    }
                }
            }
        }
    }

    /// Pushes every item in order, stopping at the first rejection.
    ///
    /// Returns the number of items accepted.
    pub fn extend<I>(&self, items: I) -> Result<usize, QueueError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut accepted = 0;
        for item in items {
            self.enqueue(item)?;
            accepted += 1;
        }
        Ok(accepted)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T, Q: fmt::Debug> fmt::Debug for QueueSender<T, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("queue", &self.queue)
            .field("backpressure", &self.config.backpressure)
            .finish()
    }
}

/// A worker that processes items from a queue, one per iteration.
///
/// Each processed item is reported through the `worked` event together with
/// its processing time; a handler error is reported through `error` with the
/// failing item attached. Neither ends the loop.
///
/// ```no_run
/// use std::time::Duration;
/// use foreman::QueueWorker;
///
/// let worker = QueueWorker::new("printer", |line: &String| -> anyhow::Result<()> {
///     println!("{line}");
///     Ok(())
/// });
/// worker.start()?;
/// worker.enqueue("hello".to_string())?;
/// worker.flush(Duration::from_secs(1));
/// worker.stop(Duration::from_secs(1), true)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct QueueWorker<T, H, Q = FifoQueue<T>>
where
    T: Send + 'static,
    H: ItemHandler<T>,
    Q: WorkQueue<T> + 'static,
{
    worker: EventWorker<Drain<T, H, Q>>,
    sender: QueueSender<T, Q>,
}

impl<T, H> QueueWorker<T, H, FifoQueue<T>>
where
    T: Send + 'static,
    H: ItemHandler<T>,
{
    /// Creates a worker over an unbounded FIFO queue.
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self::with_queue(name, handler, FifoQueue::unbounded())
    }
}

impl<T, H, Q> QueueWorker<T, H, Q>
where
    T: Send + 'static,
    H: ItemHandler<T>,
    Q: WorkQueue<T> + 'static,
{
    pub fn with_queue(name: impl Into<String>, handler: H, queue: Q) -> Self {
        let queue = Arc::new(queue);
        let worker = EventWorker::new(name, Self::drain(&queue, handler));
        let sender = Self::sender_for(queue, worker.signal().clone(), QueueConfig::default());
        Self { worker, sender }
    }

    pub fn with_config(
        name: impl Into<String>,
        handler: H,
        queue: Q,
        config: WorkerConfig,
        queue_config: QueueConfig,
    ) -> Result<Self, WorkerError> {
        if queue_config.retry_interval.is_zero() {
            return Err(WorkerError::OutOfRange(
                "queue retry interval must be greater than zero".to_string(),
            ));
        }
        let queue = Arc::new(queue);
        let signal = Signal::new();
        let worker =
            EventWorker::with_signal(name, Self::drain(&queue, handler), signal.clone(), config)?;
        let sender = Self::sender_for(queue, signal, queue_config);
        Ok(Self { worker, sender })
    }

    fn drain(queue: &Arc<Q>, handler: H) -> Drain<T, H, Q> {
        Drain {
            queue: Arc::clone(queue),
            handler,
            _items: PhantomData,
        }
    }

    fn sender_for(queue: Arc<Q>, signal: Signal, config: QueueConfig) -> QueueSender<T, Q> {
        QueueSender {
            queue,
            signal,
            config,
            _items: PhantomData,
        }
    }

    /// Adds an item to the queue; safe to call from any thread, running or not.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.sender.enqueue(item)
    }

    pub fn extend<I>(&self, items: I) -> Result<usize, QueueError>
    where
        I: IntoIterator<Item = T>,
    {
        self.sender.extend(items)
    }

    /// A producer handle that can be moved to other threads.
    pub fn sender(&self) -> QueueSender<T, Q> {
        self.sender.clone()
    }

    pub fn queue(&self) -> &Q {
        &self.sender.queue
    }

    /// Number of items waiting, not counting one currently being handled.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Waits until the queue is empty and no item is in flight.
    ///
    /// Returns `false` when the timeout elapses first, or when the worker is
    /// stopped with items still queued (a stopped worker never drains). Items
    /// enqueued concurrently with the flush may or may not be covered.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.worker.state();
            if self.is_empty() && state != WorkerState::Working {
                return true;
            }
            if !state.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.worker.notify();
            thread::sleep(FLUSH_POLL.min(deadline - now));
        }
    }

    pub fn worker(&self) -> &EventWorker<Drain<T, H, Q>> {
        &self.worker
    }

    pub fn subscribe<L>(&self, listener: L)
    where
        L: WorkerListener<T> + 'static,
    {
        self.worker.subscribe(listener);
    }

    pub fn subscribe_shared(&self, listener: Arc<dyn WorkerListener<T>>) {
        self.worker.subscribe_shared(listener);
    }

    pub fn start(&self) -> Result<bool, WorkerError> {
        self.worker.start()
    }

    pub fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        self.worker.stop(timeout, force)
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn name(&self) -> &str {
        self.worker.name()
    }
}

impl<T, H, Q> QueueWorker<T, H, Q>
where
    T: Send + Clone + 'static,
    H: ItemHandler<T>,
    Q: SnapshotQueue<T> + 'static,
{
    /// Copies the pending items without dequeuing them.
    pub fn snapshot(&self) -> Vec<T> {
        self.sender.queue.snapshot()
    }
}

impl<T, H, Q> Lifecycle for QueueWorker<T, H, Q>
where
    T: Send + 'static,
    H: ItemHandler<T>,
    Q: WorkQueue<T> + 'static,
{
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn state(&self) -> WorkerState {
        self.worker.state()
    }

    fn start(&self) -> Result<bool, WorkerError> {
        self.worker.start()
    }

    fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        self.worker.stop(timeout, force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(queue: FifoQueue<u32>, backpressure: BackpressureStrategy) -> QueueSender<u32, FifoQueue<u32>> {
        QueueSender {
            queue: Arc::new(queue),
            signal: Signal::new(),
            config: QueueConfig::default().with_backpressure(backpressure),
            _items: PhantomData,
        }
    }

    #[test]
    fn error_backpressure_reports_capacity() {
        let sender = sender(FifoQueue::bounded(1), BackpressureStrategy::Error);
        sender.enqueue(1).unwrap();
        assert_eq!(sender.enqueue(2), Err(QueueError::Full { capacity: 1 }));
        assert_eq!(sender.len(), 1);
    }

    #[test]
    fn drop_oldest_keeps_newest_items() {
        let sender = sender(FifoQueue::bounded(2), BackpressureStrategy::DropOldest);
        assert_eq!(sender.extend([1, 2, 3, 4]), Ok(4));
        assert_eq!(sender.queue.snapshot(), vec![3, 4]);
    }

    #[test]
    fn drop_newest_keeps_oldest_items() {
        let sender = sender(FifoQueue::bounded(2), BackpressureStrategy::DropNewest);
        sender.extend([1, 2, 3, 4]).unwrap();
        assert_eq!(sender.queue.snapshot(), vec![1, 2]);
    }

    #[test]
    fn enqueue_sets_signal() {
        let sender = sender(FifoQueue::unbounded(), BackpressureStrategy::Block);
        sender.enqueue(7).unwrap();
        assert!(sender.signal.is_set());
    }
}

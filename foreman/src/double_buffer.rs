//! Double-buffered hand-off between a filling worker and one consumer.
//!
//! Two buffers travel between the threads over a pair of channels: "go"
//! carries an empty buffer to the worker, "done" carries a filled buffer
//! back. A buffer is owned by exactly one side at a time, so the buffer the
//! consumer reads can never be touched by the fill function until the
//! consumer hands it back on its next read.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use flume::{Receiver, RecvTimeoutError, Sender};
use foreman_api::{Lifecycle, WorkerError, WorkerListener, WorkerState};
use tracing::trace;

use crate::config::WorkerConfig;
use crate::worker::{ItemFailure, Routine, WorkContext, WorkResult, Worker};

/// Fills one buffer on the worker thread.
///
/// Closures `FnMut(&mut B) -> anyhow::Result<()>` implement this directly.
pub trait BufferFill<B>: Send + 'static {
    fn fill(&mut self, buffer: &mut B, ctx: &WorkContext) -> anyhow::Result<()>;
}

impl<B, F> BufferFill<B> for F
where
    F: FnMut(&mut B) -> anyhow::Result<()> + Send + 'static,
{
    fn fill(&mut self, buffer: &mut B, _ctx: &WorkContext) -> anyhow::Result<()> {
        self(buffer)
    }
}

/// Worker-side routine: receives empty buffers, fills them, sends them back.
pub struct Filler<B, F> {
    fill: F,
    go: Receiver<B>,
    done: Sender<B>,
    // A buffer whose fill failed, kept for a retry.
    pending: Option<B>,
    retry_at: Option<Instant>,
}

impl<B, F> Routine for Filler<B, F>
where
    B: Send + 'static,
    F: BufferFill<B>,
{
    type Item = ();

    fn has_work(&mut self) -> bool {
        match (&self.pending, self.retry_at) {
            (Some(_), Some(at)) => Instant::now() >= at,
            (Some(_), None) => true,
            (None, _) => !self.go.is_empty(),
        }
    }

    fn wait_for_work(&mut self, ctx: &WorkContext) {
        if let Some(at) = self.retry_at.filter(|_| self.pending.is_some()) {
            let remaining = at.saturating_duration_since(Instant::now());
            ctx.sleep(remaining.min(ctx.idle_wait()));
            return;
        }
        match self.go.recv_timeout(ctx.idle_wait()) {
            Ok(buffer) => self.pending = Some(buffer),
            Err(RecvTimeoutError::Timeout) => {}
            // The consumer side is gone; fall back to a plain idle sleep.
            Err(RecvTimeoutError::Disconnected) => {
                ctx.idle();
            }
        }
    }

    fn work(&mut self, ctx: &WorkContext) -> WorkResult<()> {
        let buffer = match self.pending.take() {
            Some(buffer) => Some(buffer),
            None => self.go.try_recv().ok(),
        };
        let Some(mut buffer) = buffer else {
            return Ok(None);
        };

        match self.fill.fill(&mut buffer, ctx) {
            Ok(()) => {
                self.retry_at = None;
                if self.done.send(buffer).is_err() {
                    trace!(worker = ctx.name(), "buffer consumer gone, dropping filled buffer");
                }
                Ok(None)
            }
            Err(error) => {
                self.pending = Some(buffer);
                self.retry_at = Some(Instant::now() + ctx.idle_wait());
                Err(ItemFailure::from(error))
            }
        }
    }
}

/// A worker that fills buffers in the background for a single consumer.
///
/// The first call to [`read_next_buffer`](Self::read_next_buffer) triggers
/// the first fill and waits for it; every later call hands the previously
/// returned buffer back for refilling and returns the buffer filled in the
/// meantime. While the consumer reads one buffer, the worker fills the other.
pub struct DoubleBufferWorker<B, F>
where
    B: Send + 'static,
    F: BufferFill<B>,
{
    worker: Worker<Filler<B, F>>,
    go: Sender<B>,
    done: Receiver<B>,
    current: Option<B>,
    unsent: Vec<B>,
    in_flight: usize,
}

impl<B, F> DoubleBufferWorker<B, F>
where
    B: Send + 'static,
    F: BufferFill<B>,
{
    pub fn new(name: impl Into<String>, buffers: [B; 2], fill: F) -> Self {
        let (filler, go, done) = Self::channels(fill);
        Self::assemble(Worker::new(name, filler), go, done, buffers)
    }

    pub fn with_config(
        name: impl Into<String>,
        buffers: [B; 2],
        fill: F,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        let (filler, go, done) = Self::channels(fill);
        let worker = Worker::with_config(name, filler, config)?;
        Ok(Self::assemble(worker, go, done, buffers))
    }

    fn channels(fill: F) -> (Filler<B, F>, Sender<B>, Receiver<B>) {
        let (go_tx, go_rx) = flume::bounded(2);
        let (done_tx, done_rx) = flume::bounded(2);
        let filler = Filler {
            fill,
            go: go_rx,
            done: done_tx,
            pending: None,
            retry_at: None,
        };
        (filler, go_tx, done_rx)
    }

    fn assemble(worker: Worker<Filler<B, F>>, go: Sender<B>, done: Receiver<B>, buffers: [B; 2]) -> Self {
        let [first, second] = buffers;
        Self {
            worker,
            go,
            done,
            current: None,
            // Popped from the back, so `first` is filled first.
            unsent: vec![second, first],
            in_flight: 0,
        }
    }

    /// Waits for the next filled buffer and returns it.
    ///
    /// The returned buffer is not touched by the worker until the next call.
    /// Fails with `InvalidState` when the worker is not running or stops
    /// while the call is waiting.
    pub fn read_next_buffer(&mut self) -> Result<&B, WorkerError> {
        self.read(None)
    }

    /// Like [`read_next_buffer`](Self::read_next_buffer) but gives up after
    /// `timeout` with `WorkerError::Timeout`. A timed-out call can be retried;
    /// the fill it was waiting for is not lost.
    pub fn try_read_next_buffer(&mut self, timeout: Duration) -> Result<&B, WorkerError> {
        self.read(Some((Instant::now() + timeout, timeout)))
    }

    /// The buffer returned by the last successful read, if any.
    pub fn current(&self) -> Option<&B> {
        self.current.as_ref()
    }

    /// Mutable access to the buffer returned by the last read. The consumer
    /// owns it until the next read hands it back for refilling.
    pub fn current_mut(&mut self) -> Option<&mut B> {
        self.current.as_mut()
    }

    fn read(&mut self, deadline: Option<(Instant, Duration)>) -> Result<&B, WorkerError> {
        self.ensure_running()?;

        // Only the first read finds no buffer with the worker.
        if self.in_flight == 0 {
            if let Some(buffer) = self.unsent.pop() {
                self.hand_over(buffer)?;
            }
        }

        let filled = self.receive(deadline)?;
        self.in_flight -= 1;

        if let Some(previous) = self.current.take() {
            self.hand_over(previous)?;
        } else if let Some(spare) = self.unsent.pop() {
            self.hand_over(spare)?;
        }

        Ok(self.current.insert(filled))
    }

    fn receive(&self, deadline: Option<(Instant, Duration)>) -> Result<B, WorkerError> {
        loop {
            let mut slice = self.worker.idle_wait();
            if let Some((deadline, timeout)) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(WorkerError::Timeout {
                        name: self.worker.name().to_string(),
                        timeout,
                    });
                }
                slice = slice.min(remaining);
            }
            match self.done.recv_timeout(slice) {
                Ok(buffer) => return Ok(buffer),
                Err(RecvTimeoutError::Timeout) => self.ensure_running()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WorkerError::Other(anyhow!(
                        "fill side of worker {} is gone",
                        self.worker.name()
                    )));
                }
            }
        }
    }

    fn hand_over(&mut self, buffer: B) -> Result<(), WorkerError> {
        self.go.send(buffer).map_err(|_| {
            WorkerError::Other(anyhow!(
                "fill side of worker {} is gone",
                self.worker.name()
            ))
        })?;
        self.in_flight += 1;
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), WorkerError> {
        let state = self.worker.state();
        if state.is_running() {
            Ok(())
        } else {
            Err(WorkerError::invalid_state(self.worker.name(), "read", state))
        }
    }

    pub fn worker(&self) -> &Worker<Filler<B, F>> {
        &self.worker
    }

    pub fn subscribe<L>(&self, listener: L)
    where
        L: WorkerListener<()> + 'static,
    {
        self.worker.subscribe(listener);
    }

    pub fn subscribe_shared(&self, listener: Arc<dyn WorkerListener<()>>) {
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

impl<B, F> Lifecycle for DoubleBufferWorker<B, F>
where
    B: Send + Sync + 'static,
    F: BufferFill<B>,
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

impl<B, F> fmt::Debug for DoubleBufferWorker<B, F>
where
    B: Send + 'static,
    F: BufferFill<B>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleBufferWorker")
            .field("worker", &self.worker)
            .field("in_flight", &self.in_flight)
            .field("has_current", &self.current.is_some())
            .finish()
    }
}

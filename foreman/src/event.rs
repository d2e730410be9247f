//! Signal-driven workers.
//!
//! An [`EventWorker`] replaces the fixed idle sleep with a bounded wait on a
//! [`Signal`]. The wait is capped at the idle-wait duration, so a signal that
//! was consumed before the loop looked at it, or work that appears without a
//! signal, is still picked up on the next safety poll.

use std::sync::Arc;
use std::time::Duration;

use foreman_api::{Lifecycle, WorkerError, WorkerListener, WorkerState};

use crate::config::WorkerConfig;
use crate::signal::Signal;
use crate::worker::{Hook, Routine, WorkContext, WorkResult, Worker};

/// Routine adapter that waits on a signal instead of sleeping.
pub struct Evented<R> {
    inner: R,
    signal: Signal,
}

impl<R: Routine> Evented<R> {
    pub fn new(inner: R, signal: Signal) -> Self {
        Self { inner, signal }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: Routine> Routine for Evented<R> {
    type Item = R::Item;

    fn work(&mut self, ctx: &WorkContext) -> WorkResult<R::Item> {
        self.inner.work(ctx)
    }

    fn has_work(&mut self) -> bool {
        self.inner.has_work()
    }

    fn wait_for_work(&mut self, ctx: &WorkContext) {
        // Returns on signal or after one safety poll, whichever comes first.
        self.signal.wait_timeout(ctx.idle_wait());
    }

    fn on_start(&mut self, ctx: &WorkContext) {
        // The previous stop set the signal to release the wait.
        self.signal.reset();
        self.inner.on_start(ctx);
    }

    fn on_stop(&mut self, ctx: &WorkContext) {
        self.inner.on_stop(ctx);
    }

    fn on_skipped(&mut self, ctx: &WorkContext) {
        self.inner.on_skipped(ctx);
    }

    fn interrupt_hook(&self) -> Option<Hook> {
        self.inner.interrupt_hook()
    }

    fn wake_hook(&self) -> Option<Hook> {
        let signal = self.signal.clone();
        let inner = self.inner.wake_hook();
        Some(Arc::new(move || {
            signal.set();
            if let Some(inner) = &inner {
                inner();
            }
        }))
    }
}

/// A worker whose loop blocks on an external signal between units of work.
pub struct EventWorker<R: Routine> {
    worker: Worker<Evented<R>>,
    signal: Signal,
}

impl<R: Routine> EventWorker<R> {
    pub fn new(name: impl Into<String>, routine: R) -> Self {
        let signal = Signal::new();
        Self {
            worker: Worker::new(name, Evented::new(routine, signal.clone())),
            signal,
        }
    }

    /// Creates a worker waiting on a caller-supplied signal.
    pub fn with_signal(
        name: impl Into<String>,
        routine: R,
        signal: Signal,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        Ok(Self {
            worker: Worker::with_config(name, Evented::new(routine, signal.clone()), config)?,
            signal,
        })
    }

    /// Wakes the worker so it re-evaluates `has_work` immediately.
    pub fn notify(&self) {
        self.signal.set();
    }

    /// Handle producers can use to wake the worker.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn worker(&self) -> &Worker<Evented<R>> {
        &self.worker
    }

    pub fn subscribe<L>(&self, listener: L)
    where
        L: WorkerListener<R::Item> + 'static,
    {
        self.worker.subscribe(listener);
    }

    pub fn subscribe_shared(&self, listener: Arc<dyn WorkerListener<R::Item>>) {
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

impl<R: Routine> Lifecycle for EventWorker<R> {
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

//! # Worker Engine
//!
//! [`Worker`] owns one dedicated OS thread and drives a [`Routine`] on it.
//!
//! ## Key Concepts
//! - Lifecycle: `Stopped -> Starting -> Idle <-> Working -> Stopping -> Stopped`
//! - Loop: `while not stopping: if !has_work { wait_for_work } else { work }`
//! - Events: `starting`/`stopping`/`working` are vetoable; `started`,
//!   `worked`, `error` and `stopped` are notifications
//!
//! ## Design Principles
//! - Cooperative cancellation only: `stop` raises a [`StopToken`] and waits.
//!   A thread that overruns a forced stop is detached, never killed.
//! - Failure isolation: errors and panics in a unit of work are reported and
//!   the loop carries on.
//! - Serialized control: `start` and `stop` take a per-worker lock, so
//!   concurrent lifecycle calls run one after another.
//!
//! ## Routine Ownership
//! The routine lives in a slot. The worker thread takes it out when it
//! starts and puts it back when it exits, which is what makes a stopped
//! worker restartable.

mod listeners;
mod routine;
mod state;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use flume::{Receiver, RecvTimeoutError, Sender};
use foreman_api::{Lifecycle, WorkerError, WorkerListener, WorkerState};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::logging;
use crate::signal::StopToken;
use crate::{log_error, log_lifecycle, log_work, worker_span};

use listeners::Listeners;
pub(crate) use state::AtomicState;

pub use routine::{routine_fn, FnRoutine, Hook, ItemFailure, Routine, WorkContext, WorkResult};

/// A background worker running a [`Routine`] on its own thread.
///
/// ```rust
/// use std::time::Duration;
/// use foreman::{routine_fn, Worker};
///
/// let worker = Worker::new("janitor", routine_fn(|ctx| {
///     ctx.sleep(Duration::from_millis(5));
///     Ok(())
/// }));
/// assert!(worker.start().unwrap());
/// assert!(worker.stop(Duration::from_secs(1), false).unwrap());
/// ```
pub struct Worker<R: Routine> {
    name: Arc<str>,
    id: Uuid,
    config: WorkerConfig,
    idle_wait: Arc<AtomicU64>,
    state: Arc<AtomicState>,
    listeners: Arc<Listeners<R::Item>>,
    slot: Arc<Mutex<Option<R>>>,
    control: Mutex<Control>,
}

/// Owner-side handles of the current run.
#[derive(Default)]
struct Control {
    thread: Option<JoinHandle<()>>,
    exited: Option<Receiver<()>>,
    stop: Option<StopToken>,
    interrupt: Option<Hook>,
    wake: Option<Hook>,
    detached: Option<Arc<AtomicBool>>,
    abandoned: Option<JoinHandle<()>>,
}

impl<R: Routine> Worker<R> {
    /// Creates a stopped worker with the default configuration.
    pub fn new(name: impl Into<String>, routine: R) -> Self {
        Self::build(name.into(), routine, WorkerConfig::default())
    }

    /// Creates a stopped worker, validating `config`.
    pub fn with_config(
        name: impl Into<String>,
        routine: R,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        Ok(Self::build(name.into(), routine, config))
    }

    fn build(name: String, routine: R, config: WorkerConfig) -> Self {
        Self {
            name: Arc::from(name),
            id: Uuid::new_v4(),
            idle_wait: Arc::new(AtomicU64::new(duration_nanos(config.idle_wait))),
            config,
            state: Arc::new(AtomicState::new(WorkerState::Stopped)),
            listeners: Arc::new(Listeners::new()),
            slot: Arc::new(Mutex::new(Some(routine))),
            control: Mutex::new(Control::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance id, used to correlate log lines of workers sharing a name.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_nanos(self.idle_wait.load(Ordering::Relaxed))
    }

    /// Changes the idle-wait duration; a running loop picks it up on its next wait.
    pub fn set_idle_wait(&self, idle_wait: Duration) -> Result<(), WorkerError> {
        if idle_wait.is_zero() {
            return Err(WorkerError::OutOfRange(
                "idle wait must be greater than zero".to_string(),
            ));
        }
        self.idle_wait
            .store(duration_nanos(idle_wait), Ordering::Relaxed);
        Ok(())
    }

    /// Subscribes a listener to this worker's events.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: WorkerListener<R::Item> + 'static,
    {
        self.listeners.add(Arc::new(listener));
    }

    /// Subscribes a listener the caller keeps a handle to.
    pub fn subscribe_shared(&self, listener: Arc<dyn WorkerListener<R::Item>>) {
        self.listeners.add(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Runs `f` against the routine while the worker is stopped.
    ///
    /// Fails with `InvalidState` while a thread owns the routine.
    pub fn configure<T>(&self, f: impl FnOnce(&mut R) -> T) -> Result<T, WorkerError> {
        let mut control = self.lock_control()?;
        self.reclaim_abandoned(&mut control)?;
        let state = self.state.load();
        if state != WorkerState::Stopped {
            return Err(WorkerError::invalid_state(&self.name, "reconfigure", state));
        }
        let mut slot = self.lock_slot()?;
        let routine = slot.as_mut().ok_or_else(|| WorkerError::ThreadStillRunning {
            name: self.name.to_string(),
        })?;
        Ok(f(routine))
    }

    /// Spawns the worker thread.
    ///
    /// Returns `Ok(false)` when a `starting` listener vetoed the start; no
    /// thread is created in that case.
    pub fn start(&self) -> Result<bool, WorkerError> {
        let mut control = self.lock_control()?;
        self.reclaim_abandoned(&mut control)?;

        let state = self.state.load();
        if !self.state.transition(WorkerState::Stopped, WorkerState::Starting) {
            return Err(WorkerError::invalid_state(&self.name, "start", state));
        }

        if self.listeners.starting(&self.name).is_cancel() {
            self.state.store(WorkerState::Stopped);
            log_lifecycle!(&*self.name, "start vetoed");
            return Ok(false);
        }

        match self.spawn(&mut control) {
            Ok(()) => {
                log_lifecycle!(&*self.name, "starting", id = %self.id);
                Ok(true)
            }
            Err(error) => {
                self.state.store(WorkerState::Stopped);
                log_error!(error, worker = &*self.name);
                Err(error)
            }
        }
    }

    fn spawn(&self, control: &mut Control) -> Result<(), WorkerError> {
        let (interrupt, wake) = {
            let slot = self.lock_slot()?;
            let routine = slot.as_ref().ok_or_else(|| WorkerError::ThreadStillRunning {
                name: self.name.to_string(),
            })?;
            (routine.interrupt_hook(), routine.wake_hook())
        };

        let stop = StopToken::new();
        let detached = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = flume::bounded(1);
        let run = Run {
            ctx: WorkContext::new(Arc::clone(&self.name), Arc::clone(&self.idle_wait), stop.clone()),
            id: self.id,
            slot: Arc::clone(&self.slot),
            state: Arc::clone(&self.state),
            listeners: Arc::clone(&self.listeners),
            detached: Arc::clone(&detached),
            dispatch: logging::current_subscriber(),
            _exit: exit_tx,
        };

        let thread_name = self
            .config
            .thread_name
            .clone()
            .unwrap_or_else(|| self.name.to_string());
        let mut builder = thread::Builder::new().name(thread_name);
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        // The loop toggles Idle <-> Working, so Idle must be in place first.
        self.state.store(WorkerState::Idle);
        let handle = builder
            .spawn(move || run.execute())
            .map_err(|source| WorkerError::SpawnFailed {
                name: self.name.to_string(),
                source,
            })?;

        control.thread = Some(handle);
        control.exited = Some(exit_rx);
        control.stop = Some(stop);
        control.interrupt = interrupt;
        control.wake = wake;
        control.detached = Some(detached);
        Ok(())
    }

    /// Requests a cooperative stop and waits up to `timeout` for the thread.
    ///
    /// - `Ok(false)`: a `stopping` listener vetoed; the worker keeps running.
    /// - `Ok(true)`: the thread finished, or overran the timeout with `force`
    ///   set and was abandoned (it exits after its current unit).
    /// - `Err(StopTimeout)`: the thread overran the timeout without `force`.
    ///
    /// In every non-vetoed case the worker ends up `Stopped` and the
    /// `stopped` event fires.
    pub fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        let mut control = self.lock_control()?;

        let state = self.state.load();
        if !state.is_running() {
            return Err(WorkerError::invalid_state(&self.name, "stop", state));
        }

        if self.listeners.stopping(&self.name).is_cancel() {
            log_lifecycle!(&*self.name, "stop vetoed");
            return Ok(false);
        }

        let previous = self.state.swap(WorkerState::Stopping);
        log_lifecycle!(&*self.name, "stopping", timeout_ms = timeout.as_millis() as u64, force);

        if let Some(stop) = control.stop.take() {
            stop.cancel();
        }
        if let Some(wake) = control.wake.take() {
            wake();
        }
        let interrupt = control.interrupt.take();
        if force && previous == WorkerState::Working {
            if let Some(interrupt) = interrupt {
                debug!(worker = &*self.name, "interrupting in-flight work");
                interrupt();
            }
        }

        let result = match (control.thread.take(), control.exited.take()) {
            (Some(handle), Some(exited)) => self.join(&mut control, handle, exited, timeout, force),
            _ => Ok(true),
        };

        self.state.store(WorkerState::Stopped);
        self.listeners.stopped(&self.name);
        log_lifecycle!(&*self.name, "stopped");
        result
    }

    fn join(
        &self,
        control: &mut Control,
        handle: JoinHandle<()>,
        exited: Receiver<()>,
        timeout: Duration,
        force: bool,
    ) -> Result<bool, WorkerError> {
        match exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                if let Some(detached) = control.detached.take() {
                    detached.store(true, Ordering::SeqCst);
                }
                control.abandoned = Some(handle);
                let error = self.stop_timeout(timeout);
                self.listeners.error(&self.name, None, &error);
                if force {
                    warn!(worker = &*self.name, ?timeout, "abandoning worker thread that did not stop in time");
                    Ok(true)
                } else {
                    warn!(worker = &*self.name, ?timeout, "worker thread did not stop in time");
                    Err(self.stop_timeout(timeout))
                }
            }
            // The run drops its exit sender last, so disconnection means finished.
            Err(RecvTimeoutError::Disconnected) | Ok(()) => match handle.join() {
                Ok(()) => Ok(true),
                Err(payload) => Err(WorkerError::WorkPanicked(panic_message(payload.as_ref()))),
            },
        }
    }

    fn stop_timeout(&self, timeout: Duration) -> WorkerError {
        WorkerError::StopTimeout {
            name: self.name.to_string(),
            timeout,
        }
    }

    /// Joins a thread abandoned by an earlier forced stop once it has exited.
    fn reclaim_abandoned(&self, control: &mut Control) -> Result<(), WorkerError> {
        match control.abandoned.take() {
            Some(handle) if handle.is_finished() => {
                if handle.join().is_err() {
                    warn!(worker = &*self.name, "abandoned worker thread panicked");
                }
                Ok(())
            }
            Some(handle) => {
                control.abandoned = Some(handle);
                Err(WorkerError::ThreadStillRunning {
                    name: self.name.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    fn lock_control(&self) -> Result<MutexGuard<'_, Control>, WorkerError> {
        self.control
            .lock()
            .map_err(|_| WorkerError::Other(anyhow!("control lock of worker {} poisoned", self.name)))
    }

    fn lock_slot(&self) -> Result<MutexGuard<'_, Option<R>>, WorkerError> {
        self.slot
            .lock()
            .map_err(|_| WorkerError::Other(anyhow!("routine slot of worker {} poisoned", self.name)))
    }
}

impl<R: Routine> Lifecycle for Worker<R> {
    fn name(&self) -> &str {
        Worker::name(self)
    }

    fn state(&self) -> WorkerState {
        Worker::state(self)
    }

    fn start(&self) -> Result<bool, WorkerError> {
        Worker::start(self)
    }

    fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        Worker::stop(self, timeout, force)
    }
}

impl<R: Routine> Drop for Worker<R> {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(stop) = control.stop.take() {
            // The owner is gone; the run emits no further events.
            if let Some(detached) = control.detached.take() {
                detached.store(true, Ordering::SeqCst);
            }
            stop.cancel();
            if let Some(wake) = control.wake.take() {
                wake();
            }
            debug!(worker = &*self.name, "worker dropped while running; thread detached");
        }
    }
}

impl<R: Routine> fmt::Debug for Worker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("idle_wait", &self.idle_wait())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Everything the worker thread owns for one run.
struct Run<R: Routine> {
    ctx: WorkContext,
    id: Uuid,
    slot: Arc<Mutex<Option<R>>>,
    state: Arc<AtomicState>,
    listeners: Arc<Listeners<R::Item>>,
    // Set when the owner gave up waiting; the run then stays silent.
    detached: Arc<AtomicBool>,
    dispatch: tracing::Dispatch,
    // Dropped when the run ends; the owner waits for the disconnect.
    _exit: Sender<()>,
}

impl<R: Routine> Run<R> {
    fn execute(self) {
        let dispatch = self.dispatch.clone();
        tracing::dispatcher::with_default(&dispatch, || {
            let id = self.id.to_string();
            let span = worker_span!(self.ctx.name(), id.as_str());
            let _entered = span.enter();
            self.run_loop();
        });
    }

    fn run_loop(&self) {
        let name = self.ctx.name();
        let taken = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        let mut held = SlotReturn {
            slot: &self.slot,
            routine: taken,
        };
        let Some(routine) = held.routine.as_mut() else {
            warn!(worker = name, "worker thread found no routine to run");
            return;
        };

        self.guarded(|| self.listeners.started(name));
        log_lifecycle!(name, "started");
        self.guarded(|| routine.on_start(&self.ctx));

        while !self.ctx.is_stopping() {
            self.guarded(|| self.iterate(routine));
        }

        self.guarded(|| routine.on_stop(&self.ctx));
        log_lifecycle!(name, "exited");
    }

    fn iterate(&self, routine: &mut R) {
        let name = self.ctx.name();
        if !routine.has_work() {
            routine.wait_for_work(&self.ctx);
            return;
        }

        if self.listeners.working(name).is_cancel() {
            log_work!(name, "skipped");
            routine.on_skipped(&self.ctx);
            routine.wait_for_work(&self.ctx);
            return;
        }

        if !self.state.transition(WorkerState::Idle, WorkerState::Working) {
            // Stop requested between the checks.
            return;
        }
        let started = Instant::now();
        let result = routine.work(&self.ctx);
        let elapsed = started.elapsed();
        self.state.transition(WorkerState::Working, WorkerState::Idle);

        if self.detached.load(Ordering::SeqCst) {
            log_work!(name, "finished after detach");
            return;
        }
        match result {
            Ok(item) => {
                log_work!(name, "worked", elapsed_us = elapsed.as_micros() as u64);
                self.listeners.worked(name, item.as_ref(), elapsed);
            }
            Err(ItemFailure { item, error }) => {
                let error = WorkerError::WorkFailed(error);
                warn!(worker = name, error = %error, "work unit failed");
                self.listeners.error(name, item.as_ref(), &error);
            }
        }
    }

    /// Runs `f`, turning a panic into an `error` event.
    fn guarded(&self, f: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            self.state.transition(WorkerState::Working, WorkerState::Idle);
            let error = WorkerError::WorkPanicked(panic_message(payload.as_ref()));
            log_error!(error, worker = self.ctx.name());
            self.listeners.error(self.ctx.name(), None, &error);
        }
    }
}

/// Puts the routine back into its slot when the run ends, including by unwind.
struct SlotReturn<'a, R> {
    slot: &'a Mutex<Option<R>>,
    routine: Option<R>,
}

impl<R> Drop for SlotReturn<'_, R> {
    fn drop(&mut self) {
        if let Some(routine) = self.routine.take() {
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(routine);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

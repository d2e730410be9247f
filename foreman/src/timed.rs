//! Fixed-cadence workers.
//!
//! A [`TimedWorker`] runs its routine once per interval. Deadlines advance
//! by exactly one interval from the previous deadline rather than from the
//! end of the work, so the cadence does not drift. When a unit of work
//! overruns one or more deadlines, the missed ticks are skipped (the phase is
//! kept) and never caught up.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use foreman_api::{Lifecycle, WorkerError, WorkerListener, WorkerState};
use tracing::{debug, warn};

use crate::config::{TimerConfig, TimerMode, WorkerConfig};
use crate::worker::{Hook, Routine, WorkContext, WorkResult, Worker};

/// Routine adapter that gates the inner routine on a deadline schedule.
///
/// The inner routine's `has_work` and `wait_for_work` are not consulted.
pub struct Timed<R> {
    inner: R,
    timer: TimerConfig,
    next: Option<Instant>,
}

impl<R: Routine> Timed<R> {
    pub fn new(inner: R, timer: TimerConfig) -> Result<Self, WorkerError> {
        timer.validate()?;
        Ok(Self {
            inner,
            timer,
            next: None,
        })
    }

    /// Moves the deadline one interval forward, skipping any deadlines that
    /// have already passed. A deadline the clock cannot represent parks the
    /// timer until the next start.
    fn advance(&mut self, now: Instant) {
        let interval = self.timer.interval;
        let next = self
            .next
            .unwrap_or(now)
            .checked_add(interval)
            .and_then(|next| {
                if next > now {
                    return Some(next);
                }
                let behind = now.duration_since(next).as_nanos();
                let missed = behind / interval.as_nanos() + 1;
                debug!(missed = missed as u64, "timer overrun, skipping missed ticks");
                let skip = u64::try_from(interval.as_nanos().saturating_mul(missed)).ok()?;
                next.checked_add(Duration::from_nanos(skip))
            });
        if next.is_none() {
            warn!(interval = ?interval, "next deadline out of range, timer parked");
        }
        self.next = next;
    }
}

impl<R: Routine> Routine for Timed<R> {
    type Item = R::Item;

    fn work(&mut self, ctx: &WorkContext) -> WorkResult<R::Item> {
        let result = self.inner.work(ctx);
        self.advance(Instant::now());
        result
    }

    fn has_work(&mut self) -> bool {
        self.next.is_some_and(|next| Instant::now() >= next)
    }

    fn wait_for_work(&mut self, ctx: &WorkContext) {
        let Some(next) = self.next else {
            ctx.idle();
            return;
        };
        let remaining = next.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        match self.timer.mode {
            TimerMode::Coarse => {
                ctx.sleep(remaining.min(ctx.idle_wait()));
            }
            TimerMode::HighResolution { spin_threshold } => {
                if remaining > spin_threshold {
                    ctx.sleep((remaining - spin_threshold).min(ctx.idle_wait()));
                } else {
                    while Instant::now() < next && !ctx.is_stopping() {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }

    fn on_start(&mut self, ctx: &WorkContext) {
        self.next = None;
        self.advance(Instant::now());
        self.inner.on_start(ctx);
    }

    fn on_stop(&mut self, ctx: &WorkContext) {
        self.inner.on_stop(ctx);
    }

    /// A vetoed tick counts as taken; the next one keeps the phase.
    fn on_skipped(&mut self, ctx: &WorkContext) {
        self.advance(Instant::now());
        self.inner.on_skipped(ctx);
    }

    fn interrupt_hook(&self) -> Option<Hook> {
        self.inner.interrupt_hook()
    }

    fn wake_hook(&self) -> Option<Hook> {
        self.inner.wake_hook()
    }
}

/// A worker that fires its routine on a fixed cadence.
///
/// ```rust
/// use std::time::Duration;
/// use foreman::{routine_fn, TimedWorker};
///
/// let ticker = TimedWorker::new("metrics-flush", Duration::from_secs(10), routine_fn(|_| Ok(()))).unwrap();
/// assert!(TimedWorker::new("broken", Duration::ZERO, routine_fn(|_| Ok(()))).is_err());
/// # drop(ticker);
/// ```
pub struct TimedWorker<R: Routine> {
    worker: Worker<Timed<R>>,
    timer: Mutex<TimerConfig>,
}

impl<R: Routine> TimedWorker<R> {
    /// Coarse timer with the given interval; fails with `OutOfRange` for a
    /// zero interval.
    pub fn new(name: impl Into<String>, interval: Duration, routine: R) -> Result<Self, WorkerError> {
        Self::with_config(name, routine, TimerConfig::new(interval), WorkerConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        routine: R,
        timer: TimerConfig,
        config: WorkerConfig,
    ) -> Result<Self, WorkerError> {
        let timed = Timed::new(routine, timer.clone())?;
        Ok(Self {
            worker: Worker::with_config(name, timed, config)?,
            timer: Mutex::new(timer),
        })
    }

    pub fn interval(&self) -> Duration {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner).interval
    }

    pub fn mode(&self) -> TimerMode {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner).mode
    }

    /// Changes the interval; only allowed while stopped.
    pub fn set_interval(&self, interval: Duration) -> Result<(), WorkerError> {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        let updated = TimerConfig {
            interval,
            mode: timer.mode,
        };
        updated.validate()?;
        self.worker.configure(|timed| timed.timer = updated.clone())?;
        *timer = updated;
        Ok(())
    }

    /// Changes the timer mode; only allowed while stopped.
    pub fn set_mode(&self, mode: TimerMode) -> Result<(), WorkerError> {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        self.worker.configure(|timed| timed.timer.mode = mode)?;
        timer.mode = mode;
        Ok(())
    }

    pub fn worker(&self) -> &Worker<Timed<R>> {
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

impl<R: Routine> Lifecycle for TimedWorker<R> {
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

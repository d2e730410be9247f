use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::signal::StopToken;

/// A callback fired from the owner thread during `stop`.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Outcome of one unit of work: the processed item on success, or the item
/// together with the error on failure.
pub type WorkResult<T> = Result<Option<T>, ItemFailure<T>>;

/// A failed unit of work, optionally carrying the item it was processing.
pub struct ItemFailure<T> {
    pub item: Option<T>,
    pub error: anyhow::Error,
}

impl<T> ItemFailure<T> {
    pub fn new(item: T, error: impl Into<anyhow::Error>) -> Self {
        Self {
            item: Some(item),
            error: error.into(),
        }
    }
}

impl<T> From<anyhow::Error> for ItemFailure<T> {
    fn from(error: anyhow::Error) -> Self {
        Self { item: None, error }
    }
}

impl<T> fmt::Debug for ItemFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemFailure")
            .field("has_item", &self.item.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// Per-run view of the worker, handed to every routine callback.
#[derive(Clone)]
pub struct WorkContext {
    name: Arc<str>,
    idle_wait: Arc<AtomicU64>,
    stop: StopToken,
}

impl WorkContext {
    pub(crate) fn new(name: Arc<str>, idle_wait: Arc<AtomicU64>, stop: StopToken) -> Self {
        Self {
            name,
            idle_wait,
            stop,
        }
    }

    /// Name of the worker running this routine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current idle-wait duration; may change while the worker runs.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_nanos(self.idle_wait.load(Ordering::Relaxed))
    }

    /// Whether `stop` has been requested for this run.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Sleeps for `duration` unless a stop is requested first.
    ///
    /// Returns `false` when woken by a stop request.
    pub fn sleep(&self, duration: Duration) -> bool {
        !self.stop.wait_timeout(duration)
    }

    /// Sleeps for one idle-wait period; see [`WorkContext::sleep`].
    pub fn idle(&self) -> bool {
        self.sleep(self.idle_wait())
    }
}

impl fmt::Debug for WorkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkContext")
            .field("name", &self.name)
            .field("idle_wait", &self.idle_wait())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

/// The body of a worker loop.
///
/// The engine calls `has_work` once per iteration; when it returns `false`
/// the loop calls `wait_for_work` and polls again, otherwise it runs exactly
/// one `work` unit. All of these run on the worker thread. Errors and panics
/// from `work` are reported through the `error` event and never end the loop.
pub trait Routine: Send + 'static {
    /// Payload reported with `worked` and `error` events.
    type Item: Send + 'static;

    /// Runs one unit of work.
    fn work(&mut self, ctx: &WorkContext) -> WorkResult<Self::Item>;

    fn has_work(&mut self) -> bool {
        true
    }

    /// Blocks until work may be available. The default sleeps for the
    /// idle-wait duration, returning early on stop.
    fn wait_for_work(&mut self, ctx: &WorkContext) {
        ctx.idle();
    }

    /// Called on the worker thread before the first iteration of each run.
    fn on_start(&mut self, _ctx: &WorkContext) {}

    /// Called on the worker thread after the last iteration of each run.
    fn on_stop(&mut self, _ctx: &WorkContext) {}

    /// Called when a `working` listener vetoed the pending unit, before the
    /// loop waits for work again. Routines that schedule work by deadline
    /// move the deadline here so the skipped unit is not retried at once.
    fn on_skipped(&mut self, _ctx: &WorkContext) {}

    /// Hook fired by a forced `stop` while a unit of work is in flight.
    fn interrupt_hook(&self) -> Option<Hook> {
        None
    }

    /// Hook fired by every `stop`, to release blocking waits early.
    fn wake_hook(&self) -> Option<Hook> {
        None
    }
}

/// A routine backed by a closure.
pub struct FnRoutine<F> {
    f: F,
}

/// Wraps a closure as a [`Routine`] that always has work.
///
/// ```rust
/// use foreman::{routine_fn, Worker};
///
/// let worker = Worker::new("heartbeat", routine_fn(|_ctx| {
///     tracing::debug!("beat");
///     Ok(())
/// }));
/// ```
pub fn routine_fn<F>(f: F) -> FnRoutine<F>
where
    F: FnMut(&WorkContext) -> anyhow::Result<()> + Send + 'static,
{
    FnRoutine { f }
}

impl<F> Routine for FnRoutine<F>
where
    F: FnMut(&WorkContext) -> anyhow::Result<()> + Send + 'static,
{
    type Item = ();

    fn work(&mut self, ctx: &WorkContext) -> WorkResult<()> {
        (self.f)(ctx)?;
        Ok(None)
    }
}

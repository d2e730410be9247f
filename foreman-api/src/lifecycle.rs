//! # Lifecycle Contract
//!
//! The start/stop surface shared by single workers and worker collections.
//! Anything implementing [`Lifecycle`] can be placed in a collection and
//! started or stopped as one unit.

use std::time::Duration;

use crate::errors::WorkerError;
use crate::state::WorkerState;

/// Start/stop control over a background worker.
///
/// Both operations return `Ok(false)` when a listener vetoed the transition
/// and `Err` when the call itself was invalid or failed. Implementations are
/// expected to serialize concurrent lifecycle calls internally.
pub trait Lifecycle: Send + Sync {
    /// Diagnostic name, also used as the thread name.
    fn name(&self) -> &str;

    /// Snapshot of the current state.
    fn state(&self) -> WorkerState;

    /// Spawns the worker thread.
    ///
    /// Fails with [`WorkerError::InvalidState`] unless the worker is stopped.
    fn start(&self) -> Result<bool, WorkerError>;

    /// Requests cooperative cancellation and waits up to `timeout` for the
    /// thread to finish. With `force`, a thread that does not finish in time
    /// is abandoned instead of reported as a failure.
    ///
    /// Fails with [`WorkerError::InvalidState`] unless the worker is running.
    fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError>;

    /// Whether the worker is currently running.
    fn is_running(&self) -> bool {
        self.state().is_running()
    }
}

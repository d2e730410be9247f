//! Bridge for async hosts.
//!
//! `stop` blocks for up to its timeout while the worker thread finishes.
//! Calling it directly from an async task would stall the executor thread,
//! so [`stop_in_background`] runs it on tokio's blocking pool instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use foreman_api::{Lifecycle, WorkerError};

/// Stops `worker` on the blocking thread pool and awaits the outcome.
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use foreman::{routine_fn, stop_in_background, Lifecycle, Worker};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), foreman::WorkerError> {
/// let worker = Arc::new(Worker::new("poller", routine_fn(|_ctx| Ok(()))));
/// worker.start()?;
/// assert!(stop_in_background(worker, Duration::from_secs(1), false).await?);
/// # Ok(())
/// # }
/// ```
pub async fn stop_in_background<L>(
    worker: Arc<L>,
    timeout: Duration,
    force: bool,
) -> Result<bool, WorkerError>
where
    L: Lifecycle + ?Sized + 'static,
{
    let name = worker.name().to_string();
    tokio::task::spawn_blocking(move || worker.stop(timeout, force))
        .await
        .map_err(|error| WorkerError::Other(anyhow!("stop task for worker {name} failed: {error}")))?
}

//! Drop-folder worker fed by file-system notifications.
//!
//! A [`DropFolderWorker`] watches one directory (not recursively) and hands
//! the path of every newly created entry to a [`QueueWorker`]. The watcher
//! only lives while the worker runs: `start` installs it before the queue
//! worker starts, `stop` removes it before the queue worker stops, so no
//! notification is enqueued into a stopped worker.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use foreman_api::{Lifecycle, WorkerError, WorkerListener, WorkerState};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, warn};

use crate::log_lifecycle;
use crate::queue::{FifoQueue, ItemHandler, QueueWorker};

/// Processes every file created in a directory on a dedicated worker thread.
pub struct DropFolderWorker<H>
where
    H: ItemHandler<PathBuf>,
{
    folder: PathBuf,
    queue: QueueWorker<PathBuf, H, FifoQueue<PathBuf>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl<H> DropFolderWorker<H>
where
    H: ItemHandler<PathBuf>,
{
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>, handler: H) -> Self {
        Self::with_queue_worker(folder, QueueWorker::new(name, handler))
    }

    /// Wraps an already configured queue worker.
    pub fn with_queue_worker(
        folder: impl Into<PathBuf>,
        queue: QueueWorker<PathBuf, H, FifoQueue<PathBuf>>,
    ) -> Self {
        Self {
            folder: folder.into(),
            queue,
            watcher: Mutex::new(None),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn queue(&self) -> &QueueWorker<PathBuf, H, FifoQueue<PathBuf>> {
        &self.queue
    }

    /// Number of created paths not yet handled.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn subscribe<L>(&self, listener: L)
    where
        L: WorkerListener<PathBuf> + 'static,
    {
        self.queue.subscribe(listener);
    }

    /// Installs the directory watcher, then starts the queue worker.
    ///
    /// A watcher that cannot be created or attached fails with
    /// `WorkerError::Other` and leaves the worker stopped.
    pub fn start(&self) -> Result<bool, WorkerError> {
        let mut slot = self.lock_watcher()?;
        let state = self.queue.state();
        if state != WorkerState::Stopped {
            return Err(WorkerError::invalid_state(self.queue.name(), "start", state));
        }

        let watcher = self.watch()?;
        match self.queue.start() {
            Ok(true) => {
                *slot = Some(watcher);
                log_lifecycle!(self.queue.name(), "watching", folder = %self.folder.display());
                Ok(true)
            }
            // Dropping the watcher unsubscribes it.
            other => other,
        }
    }

    /// Removes the directory watcher, then stops the queue worker.
    ///
    /// Paths already queued stay queued and are handled after a restart.
    pub fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        let mut slot = self.lock_watcher()?;
        let state = self.queue.state();
        if !state.is_running() {
            return Err(WorkerError::invalid_state(self.queue.name(), "stop", state));
        }

        let watcher = slot.take();
        let result = self.queue.stop(timeout, force);
        if matches!(result, Ok(false)) {
            // Vetoed: the worker keeps running, so keep feeding it.
            *slot = watcher;
        } else {
            drop(watcher);
            debug!(worker = self.queue.name(), "folder watcher removed");
        }
        result
    }

    pub fn state(&self) -> WorkerState {
        self.queue.state()
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    fn watch(&self) -> Result<RecommendedWatcher, WorkerError> {
        let sender = self.queue.sender();
        let name = self.queue.name().to_string();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if matches!(event.kind, EventKind::Create(_)) => {
                    for path in event.paths {
                        if let Err(e) = sender.enqueue(path) {
                            warn!(worker = %name, error = %e, "dropping created path");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => error!(worker = %name, error = %e, "folder watch error"),
            },
            Config::default(),
        )
        .map_err(|e| WorkerError::Other(anyhow!("failed to create folder watcher: {e}")))?;

        watcher
            .watch(&self.folder, RecursiveMode::NonRecursive)
            .map_err(|e| {
                WorkerError::Other(anyhow!(
                    "failed to watch {}: {e}",
                    self.folder.display()
                ))
            })?;
        Ok(watcher)
    }

    fn lock_watcher(&self) -> Result<MutexGuard<'_, Option<RecommendedWatcher>>, WorkerError> {
        self.watcher
            .lock()
            .map_err(|_| WorkerError::Other(anyhow!("watcher lock of {} poisoned", self.queue.name())))
    }
}

impl<H> Lifecycle for DropFolderWorker<H>
where
    H: ItemHandler<PathBuf>,
{
    fn name(&self) -> &str {
        self.queue.name()
    }

    fn state(&self) -> WorkerState {
        self.queue.state()
    }

    fn start(&self) -> Result<bool, WorkerError> {
        DropFolderWorker::start(self)
    }

    fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        DropFolderWorker::stop(self, timeout, force)
    }
}

//! # Worker Collections
//!
//! [`Workers`] starts and stops an ordered group of workers as one unit.
//!
//! - `start` is all-or-nothing: members start in order, and the first member
//!   that fails or vetoes causes every member started before it to be
//!   stopped again, in reverse order, before `start` returns.
//! - `stop` attempts every running member in reverse order, whatever happens
//!   to the others, and reports all failures together as
//!   [`WorkerError::Aggregate`].
//!
//! A collection is itself a [`Lifecycle`], so collections nest.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use foreman_api::{Lifecycle, WorkerError, WorkerState};
use tracing::{debug, warn};

use crate::config::DEFAULT_STOP_TIMEOUT;
use crate::log_lifecycle;
use crate::worker::AtomicState;

/// An ordered collection of workers with all-or-nothing startup.
pub struct Workers {
    name: String,
    members: RwLock<Vec<Arc<dyn Lifecycle>>>,
    state: AtomicState,
    rollback_timeout: Duration,
    failures: Mutex<Vec<WorkerError>>,
    control: Mutex<()>,
}

impl Workers {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: RwLock::new(Vec::new()),
            state: AtomicState::new(WorkerState::Stopped),
            rollback_timeout: DEFAULT_STOP_TIMEOUT,
            failures: Mutex::new(Vec::new()),
            control: Mutex::new(()),
        }
    }

    /// Sets how long each member gets to stop when a failed start is rolled back.
    pub fn with_rollback_timeout(mut self, timeout: Duration) -> Self {
        self.rollback_timeout = timeout;
        self
    }

    /// Appends a worker. It is started with the next `start` of the collection.
    pub fn add<L>(&self, worker: L)
    where
        L: Lifecycle + 'static,
    {
        self.add_shared(Arc::new(worker));
    }

    /// Appends a worker the caller keeps a handle to.
    pub fn add_shared(&self, worker: Arc<dyn Lifecycle>) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(worker);
    }

    pub fn len(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Member names in start order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|member| member.name().to_string())
            .collect()
    }

    /// Takes the member failures recorded by the last unsuccessful `start`.
    pub fn take_failures(&self) -> Vec<WorkerError> {
        std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn snapshot(&self) -> Vec<Arc<dyn Lifecycle>> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_control(&self) -> Result<MutexGuard<'_, ()>, WorkerError> {
        self.control
            .lock()
            .map_err(|_| WorkerError::Other(anyhow!("control lock of {} poisoned", self.name)))
    }

    /// Starts every member in order.
    ///
    /// Returns `Ok(false)` when a member failed to start or vetoed; by then
    /// every member started before it has been stopped again and the
    /// failures are available from [`take_failures`](Self::take_failures).
    pub fn start(&self) -> Result<bool, WorkerError> {
        let _control = self.lock_control()?;
        let state = self.state.load();
        if !self.state.transition(WorkerState::Stopped, WorkerState::Starting) {
            return Err(WorkerError::invalid_state(&self.name, "start", state));
        }

        let members = self.snapshot();
        let mut started: Vec<&Arc<dyn Lifecycle>> = Vec::with_capacity(members.len());
        let mut failure = None;
        for member in &members {
            match member.start() {
                Ok(true) => started.push(member),
                Ok(false) => {
                    failure = Some(WorkerError::Vetoed {
                        name: member.name().to_string(),
                        operation: "start",
                    });
                    break;
                }
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        let Some(failure) = failure else {
            self.state.store(WorkerState::Idle);
            log_lifecycle!(self.name.as_str(), "started", members = members.len());
            return Ok(true);
        };

        warn!(workers = %self.name, error = %failure, "member failed to start; rolling back");
        let mut failures = vec![failure];
        for member in started.iter().rev() {
            debug!(workers = %self.name, member = member.name(), "rolling back");
            match member.stop(self.rollback_timeout, true) {
                Ok(true) => {}
                Ok(false) => failures.push(WorkerError::Vetoed {
                    name: member.name().to_string(),
                    operation: "stop",
                }),
                Err(error) => failures.push(error),
            }
        }

        self.state.store(WorkerState::Stopped);
        *self.failures.lock().unwrap_or_else(PoisonError::into_inner) = failures;
        log_lifecycle!(self.name.as_str(), "start rolled back", members = started.len());
        Ok(false)
    }

    /// Stops every running member in reverse order.
    ///
    /// Each member gets its own `timeout`. All members are attempted; any
    /// failures, including vetoes, come back together as
    /// `Err(WorkerError::Aggregate)`.
    pub fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        let _control = self.lock_control()?;
        let state = self.state.load();
        if !state.is_running() {
            return Err(WorkerError::invalid_state(&self.name, "stop", state));
        }
        self.state.store(WorkerState::Stopping);

        let mut failures = Vec::new();
        for member in self.snapshot().iter().rev() {
            if !member.is_running() {
                continue;
            }
            match member.stop(timeout, force) {
                Ok(true) => {}
                Ok(false) => failures.push(WorkerError::Vetoed {
                    name: member.name().to_string(),
                    operation: "stop",
                }),
                Err(error) => {
                    warn!(workers = %self.name, member = member.name(), error = %error, "member failed to stop");
                    failures.push(error);
                }
            }
        }

        self.state.store(WorkerState::Stopped);
        log_lifecycle!(self.name.as_str(), "stopped", failures = failures.len());
        if failures.is_empty() {
            Ok(true)
        } else {
            Err(WorkerError::Aggregate(failures))
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Lifecycle for Workers {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> WorkerState {
        self.state.load()
    }

    fn start(&self) -> Result<bool, WorkerError> {
        Workers::start(self)
    }

    fn stop(&self, timeout: Duration, force: bool) -> Result<bool, WorkerError> {
        Workers::stop(self, timeout, force)
    }
}

impl fmt::Debug for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workers")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("members", &self.names())
            .finish()
    }
}

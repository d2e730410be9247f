use std::time::Duration;

use foreman_api::WorkerError;

/// Default bounded wait between polls when a worker has no work.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(100);

/// Default join timeout used when a worker is stopped implicitly.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default window before a high-resolution deadline in which the timer spins.
pub const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Longest accepted timer interval (one year).
pub const MAX_TIMER_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// --- Worker Configuration ---

/// Configuration shared by every worker kind.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// How long the loop waits for work before polling `has_work` again.
    pub idle_wait: Duration,

    /// Stack size of the worker thread; the platform default when `None`.
    pub stack_size: Option<usize>,

    /// OS thread name; the worker name when `None`.
    pub thread_name: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_wait: DEFAULT_IDLE_WAIT,
            stack_size: None,
            thread_name: None,
        }
    }
}

impl WorkerConfig {
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Rejects a zero idle wait and a zero stack size.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.idle_wait.is_zero() {
            return Err(WorkerError::OutOfRange(
                "idle wait must be greater than zero".to_string(),
            ));
        }
        if self.stack_size == Some(0) {
            return Err(WorkerError::InvalidConfig(
                "stack size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Timer Configuration ---

/// How a timed worker waits for its next deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// Sleep in idle-wait slices; precision is that of the OS sleep.
    #[default]
    Coarse,
    /// Sleep until shortly before the deadline, then spin on the monotonic
    /// clock for the remaining `spin_threshold`.
    HighResolution { spin_threshold: Duration },
}

impl TimerMode {
    /// High-resolution mode with the default spin window.
    pub fn high_resolution() -> Self {
        TimerMode::HighResolution {
            spin_threshold: DEFAULT_SPIN_THRESHOLD,
        }
    }
}

/// Cadence of a timed worker.
#[derive(Clone, Debug)]
pub struct TimerConfig {
    /// Time between consecutive deadlines. Must be greater than zero.
    pub interval: Duration,

    pub mode: TimerMode,
}

impl TimerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            mode: TimerMode::Coarse,
        }
    }

    pub fn with_mode(mut self, mode: TimerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.interval.is_zero() {
            return Err(WorkerError::OutOfRange(
                "timer interval must be greater than zero".to_string(),
            ));
        }
        if self.interval > MAX_TIMER_INTERVAL {
            return Err(WorkerError::OutOfRange(format!(
                "timer interval {:?} exceeds the maximum of {:?}",
                self.interval, MAX_TIMER_INTERVAL
            )));
        }
        Ok(())
    }
}

// --- Queue Configuration ---

/// Defines the behavior when an item is enqueued into a full queue.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    /// Retry until the queue accepts the item.
    #[default]
    Block,
    /// Return `QueueError::Full` immediately.
    Error,
    /// Evict one queued item to make space for the new one.
    DropOldest,
    /// Discard the new item.
    DropNewest,
}

/// Configuration of a queue-driven worker's producer side.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub backpressure: BackpressureStrategy,

    /// Pause between attempts while blocking on a full queue.
    pub retry_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backpressure: BackpressureStrategy::Block,
            retry_interval: Duration::from_millis(1),
        }
    }
}

impl QueueConfig {
    pub fn with_backpressure(mut self, backpressure: BackpressureStrategy) -> Self {
        self.backpressure = backpressure;
        self
    }
}

// Foreman Worker Framework Implementation
//
// This crate provides the worker engine and the concrete worker kinds for the
// contract defined in `foreman-api`. Every worker owns one dedicated OS thread.

pub mod config;
pub mod double_buffer;
pub mod event;
pub mod listener;
pub mod logging;
pub mod queue;
pub mod runtime;
pub mod signal;
pub mod timed;
#[cfg(feature = "fs-watch")]
pub mod watch;
pub mod worker;
pub mod workers;

// Re-export commonly used types
pub use config::{
    BackpressureStrategy, QueueConfig, TimerConfig, TimerMode, WorkerConfig, DEFAULT_IDLE_WAIT,
    DEFAULT_SPIN_THRESHOLD, DEFAULT_STOP_TIMEOUT, MAX_TIMER_INTERVAL,
};
pub use double_buffer::{BufferFill, DoubleBufferWorker};
pub use event::EventWorker;
pub use foreman_api::{
    Lifecycle, QueueError, SnapshotQueue, Verdict, WorkQueue, WorkerError, WorkerEvent,
    WorkerListener, WorkerState,
};
pub use listener::{ChannelListener, TracingListener};
pub use queue::{
    FifoQueue, ItemHandler, PriorityQueue, QueueSender, QueueWorker, RingQueue, SegmentQueue,
};
pub use runtime::stop_in_background;
pub use signal::{Signal, StopToken};
pub use timed::TimedWorker;
#[cfg(feature = "fs-watch")]
pub use watch::DropFolderWorker;
pub use worker::{routine_fn, ItemFailure, Routine, WorkContext, WorkResult, Worker};
pub use workers::Workers;

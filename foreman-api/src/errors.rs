//! # Worker Error Types
//!
//! Errors fall into four groups:
//!
//! - Configuration errors (invalid interval, double start) fail fast at the
//!   offending call.
//! - Work-unit errors are caught per iteration and reported through the
//!   `error` event; they never terminate the worker.
//! - Lifecycle errors (join timeout) are reported through the `error` event
//!   and returned from `stop`.
//! - Aggregate errors collect the per-member failures of a worker collection.
//!
//! ## Usage Example
//!
//! ```rust
//! use foreman_api::{WorkerError, WorkerState};
//!
//! fn describe(error: &WorkerError) -> &'static str {
//!     match error {
//!         WorkerError::InvalidState { state: WorkerState::Stopped, .. } => "not started",
//!         WorkerError::InvalidState { .. } => "busy",
//!         WorkerError::StopTimeout { .. } => "stuck",
//!         _ => "other",
//!     }
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::state::WorkerState;

/// Errors raised by worker lifecycle operations and reported by work units.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker {name} cannot {operation} while {state}")]
    InvalidState {
        name: String,
        operation: &'static str,
        state: WorkerState,
    },
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to spawn thread for worker {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Worker {name} did not stop within {timeout:?}")]
    StopTimeout { name: String, timeout: Duration },
    #[error("Worker {name} still has an abandoned thread running")]
    ThreadStillRunning { name: String },
    #[error("Worker {name}: {operation} was vetoed by a listener")]
    Vetoed {
        name: String,
        operation: &'static str,
    },
    #[error("Worker {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
    #[error("Work unit failed: {0}")]
    WorkFailed(#[source] anyhow::Error),
    #[error("Work unit panicked: {0}")]
    WorkPanicked(String),
    #[error("{} worker operation(s) failed", .0.len())]
    Aggregate(Vec<WorkerError>),
    #[error("Internal worker error: {0}")]
    Other(#[from] anyhow::Error),
}

impl WorkerError {
    pub fn invalid_state(name: &str, operation: &'static str, state: WorkerState) -> Self {
        WorkerError::InvalidState {
            name: name.to_string(),
            operation,
            state,
        }
    }
}

/// Errors raised when handing items to a queue-driven worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is full (capacity: {capacity})")]
    Full { capacity: usize },
}

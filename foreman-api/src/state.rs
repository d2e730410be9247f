//! # Worker State
//!
//! A worker moves through a single explicit state value:
//!
//! ```text
//! Stopped --start--> Starting --spawned--> Idle <--> Working
//!    ^                  |                   |          |
//!    |               (veto)                 +--stop----+
//!    |                  v                   v
//!    +------------- Stopped          Stopping --joined--> Stopped
//! ```
//!
//! `Starting` and `Stopping` are transient and never overlap. `Idle` and
//! `Working` together make up "running".

use std::fmt;

/// The lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// No thread exists; the worker may be started.
    Stopped = 0,
    /// `start` is in progress.
    Starting = 1,
    /// The thread is running and waiting for work.
    Idle = 2,
    /// The thread is running a unit of work.
    Working = 3,
    /// `stop` is in progress.
    Stopping = 4,
}

impl WorkerState {
    /// Whether the worker owns a live, non-stopping thread.
    pub fn is_running(self) -> bool {
        matches!(self, WorkerState::Idle | WorkerState::Working)
    }

    /// Whether the state is one of the short-lived transition states.
    pub fn is_transient(self) -> bool {
        matches!(self, WorkerState::Starting | WorkerState::Stopping)
    }

    /// Decodes a state previously encoded with `as u8`.
    ///
    /// Unknown values decode to `Stopped`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Starting,
            2 => WorkerState::Idle,
            3 => WorkerState::Working,
            4 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        WorkerState::Stopped
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Starting => "starting",
            WorkerState::Idle => "idle",
            WorkerState::Working => "working",
            WorkerState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

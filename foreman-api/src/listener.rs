//! # Worker Events
//!
//! Workers report their lifecycle and every iteration of their loop to
//! listeners. Three of the events are vetoable:
//!
//! - `starting`: returning [`Verdict::Cancel`] aborts `start` before a thread
//!   is spawned.
//! - `stopping`: returning [`Verdict::Cancel`] leaves the worker running.
//! - `working`: returning [`Verdict::Cancel`] skips one iteration.
//!
//! `started`, `working`, `worked` and `error` are raised on the worker thread
//! in strict order. `starting`, `stopping` and `stopped` are raised on the
//! thread calling `start`/`stop`; `stopped` only after the worker thread has
//! finished or been abandoned.

use std::time::Duration;

use crate::errors::WorkerError;

/// Answer of a listener to a vetoable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Let the transition happen.
    #[default]
    Proceed,
    /// Veto the transition.
    Cancel,
}

impl Verdict {
    /// Combines two verdicts; any cancel wins.
    pub fn and(self, other: Verdict) -> Verdict {
        if self == Verdict::Cancel || other == Verdict::Cancel {
            Verdict::Cancel
        } else {
            Verdict::Proceed
        }
    }

    pub fn is_cancel(self) -> bool {
        self == Verdict::Cancel
    }
}

/// Observer of a worker's lifecycle and iterations.
///
/// `T` is the item type the worker reports with `worked` and `error`; plain
/// workers use `()` and never pass an item. Every method has a no-op default,
/// so listeners only override what they care about.
pub trait WorkerListener<T = ()>: Send + Sync {
    fn starting(&self, _worker: &str) -> Verdict {
        Verdict::Proceed
    }

    fn started(&self, _worker: &str) {}

    fn working(&self, _worker: &str) -> Verdict {
        Verdict::Proceed
    }

    /// A unit of work completed. `item` is the dequeued payload, if any.
    fn worked(&self, _worker: &str, _item: Option<&T>, _elapsed: Duration) {}

    /// A unit of work or a lifecycle step failed. The loop keeps running.
    fn error(&self, _worker: &str, _item: Option<&T>, _error: &WorkerError) {}

    fn stopping(&self, _worker: &str) -> Verdict {
        Verdict::Proceed
    }

    fn stopped(&self, _worker: &str) {}
}

/// Owned form of a worker event, for delivery over channels.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent<T> {
    Starting { worker: String },
    Started { worker: String },
    Working { worker: String },
    Worked { worker: String, item: Option<T>, elapsed: Duration },
    Error { worker: String, item: Option<T>, message: String },
    Stopping { worker: String },
    Stopped { worker: String },
}

impl<T> WorkerEvent<T> {
    /// Name of the worker that raised the event.
    pub fn worker(&self) -> &str {
        match self {
            WorkerEvent::Starting { worker }
            | WorkerEvent::Started { worker }
            | WorkerEvent::Working { worker }
            | WorkerEvent::Worked { worker, .. }
            | WorkerEvent::Error { worker, .. }
            | WorkerEvent::Stopping { worker }
            | WorkerEvent::Stopped { worker } => worker,
        }
    }

    /// Short lowercase label of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Starting { .. } => "starting",
            WorkerEvent::Started { .. } => "started",
            WorkerEvent::Working { .. } => "working",
            WorkerEvent::Worked { .. } => "worked",
            WorkerEvent::Error { .. } => "error",
            WorkerEvent::Stopping { .. } => "stopping",
            WorkerEvent::Stopped { .. } => "stopped",
        }
    }

    /// The item carried by `Worked` or `Error`, if any.
    pub fn item(&self) -> Option<&T> {
        match self {
            WorkerEvent::Worked { item, .. } | WorkerEvent::Error { item, .. } => item.as_ref(),
            _ => None,
        }
    }
}

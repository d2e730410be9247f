//! # Foreman Worker API
//!
//! Foreman is a small framework for long-lived background loops, each running
//! on its own dedicated OS thread with a managed start/stop lifecycle. This
//! crate holds the abstract contract that every worker implementation honours;
//! the `foreman` crate provides the engine and the concrete worker kinds.
//!
//! ## Design Principles
//!
//! - **One state value**: a worker is always in exactly one [`WorkerState`],
//!   so illegal combinations such as "stopping while not started" cannot be
//!   represented.
//! - **Cooperative cancellation**: stopping a worker asks it to finish its
//!   current unit of work; nothing is ever preempted.
//! - **Explicit observation**: lifecycle and per-iteration events are delivered
//!   through the [`WorkerListener`] observer trait, or as owned
//!   [`WorkerEvent`] messages.
//! - **Injected queues**: producer/consumer queues are a capability
//!   ([`WorkQueue`]) rather than a hardcoded type.
//!
//! ## Module Organization
//!
//! - [`state`]: the explicit worker state machine
//! - [`lifecycle`]: the start/stop contract shared by workers and collections
//! - [`listener`]: observer trait, veto verdicts and owned event messages
//! - [`queue`]: producer/consumer queue capability traits
//! - [`errors`]: error types

pub mod errors;
pub mod lifecycle;
pub mod listener;
pub mod queue;
pub mod state;

pub use errors::{QueueError, WorkerError};
pub use lifecycle::Lifecycle;
pub use listener::{Verdict, WorkerEvent, WorkerListener};
pub use queue::{SnapshotQueue, WorkQueue};
pub use state::WorkerState;

//! # Wait Primitives
//!
//! Two small blocking primitives used by worker threads:
//!
//! - [`StopToken`]: the cooperative cancellation flag of one worker run.
//!   Cancelling it wakes every thread blocked in [`StopToken::wait_timeout`].
//! - [`Signal`]: an auto-reset wake-up signal. `set` releases one waiter;
//!   the wait consumes the signal.
//!
//! Both are built on `flume` channels: a stop token is a channel whose only
//! sender is dropped on cancel, and a signal is a channel of capacity one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

/// Cooperative cancellation flag for one run of a worker thread.
///
/// A fresh token is created on every start, so cancelling never needs to be
/// undone.
#[derive(Clone)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

struct StopInner {
    cancelled: AtomicBool,
    // Dropped on cancel; receivers then observe disconnection.
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl StopToken {
    pub fn new() -> Self {
        let (sender, receiver) = flume::bounded(1);
        Self {
            inner: Arc::new(StopInner {
                cancelled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Requests cancellation and wakes all waiters. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks for up to `timeout`, returning early when cancelled.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.receiver.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Auto-reset wake-up signal shared between producers and a worker thread.
///
/// Setting an already set signal is a no-op; a successful wait resets it.
#[derive(Clone)]
pub struct Signal {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl Signal {
    pub fn new() -> Self {
        let (sender, receiver) = flume::bounded(1);
        Self { sender, receiver }
    }

    /// Marks the signal set, releasing one waiter.
    pub fn set(&self) {
        // Full means already set.
        let _ = self.sender.try_send(());
    }

    /// Clears the signal without waiting.
    pub fn reset(&self) {
        while self.receiver.try_recv().is_ok() {}
    }

    pub fn is_set(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Waits up to `timeout` for the signal, consuming it.
    ///
    /// Returns `true` if the signal was set, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.receiver.recv_timeout(timeout).is_ok()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("set", &self.is_set()).finish()
    }
}

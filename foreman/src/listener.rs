//! Ready-made listeners.
//!
//! - [`ChannelListener`] turns every callback into an owned [`WorkerEvent`]
//!   sent over a `flume` channel, which is how tests and hosts that prefer
//!   message passing observe a worker.
//! - [`TracingListener`] logs every event through `tracing`.

use std::fmt;
use std::time::Duration;

use flume::{Receiver, Sender};
use foreman_api::{Verdict, WorkerError, WorkerEvent, WorkerListener};
use tracing::{debug, info, trace, warn};

/// Forwards worker events over an unbounded channel.
///
/// Never vetoes. Events are dropped silently once the receiver is gone.
pub struct ChannelListener<T> {
    sender: Sender<WorkerEvent<T>>,
}

impl<T> ChannelListener<T> {
    /// Creates a listener and the receiving end of its channel.
    pub fn new() -> (Self, Receiver<WorkerEvent<T>>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    /// Creates a listener sending into an existing channel, so several
    /// workers can share one receiver.
    pub fn with_sender(sender: Sender<WorkerEvent<T>>) -> Self {
        Self { sender }
    }

    fn send(&self, event: WorkerEvent<T>) {
        let _ = self.sender.send(event);
    }
}

impl<T> Clone for ChannelListener<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> fmt::Debug for ChannelListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelListener")
            .field("pending", &self.sender.len())
            .finish()
    }
}

impl<T> WorkerListener<T> for ChannelListener<T>
where
    T: Clone + Send,
{
    fn starting(&self, worker: &str) -> Verdict {
        self.send(WorkerEvent::Starting {
            worker: worker.to_string(),
        });
        Verdict::Proceed
    }

    fn started(&self, worker: &str) {
        self.send(WorkerEvent::Started {
            worker: worker.to_string(),
        });
    }

    fn working(&self, worker: &str) -> Verdict {
        self.send(WorkerEvent::Working {
            worker: worker.to_string(),
        });
        Verdict::Proceed
    }

    fn worked(&self, worker: &str, item: Option<&T>, elapsed: Duration) {
        self.send(WorkerEvent::Worked {
            worker: worker.to_string(),
            item: item.cloned(),
            elapsed,
        });
    }

    fn error(&self, worker: &str, item: Option<&T>, error: &WorkerError) {
        self.send(WorkerEvent::Error {
            worker: worker.to_string(),
            item: item.cloned(),
            message: error.to_string(),
        });
    }

    fn stopping(&self, worker: &str) -> Verdict {
        self.send(WorkerEvent::Stopping {
            worker: worker.to_string(),
        });
        Verdict::Proceed
    }

    fn stopped(&self, worker: &str) {
        self.send(WorkerEvent::Stopped {
            worker: worker.to_string(),
        });
    }
}

/// Logs worker events: lifecycle at info, iterations at trace, errors at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl<T: fmt::Debug> WorkerListener<T> for TracingListener {
    fn starting(&self, worker: &str) -> Verdict {
        debug!(worker, "starting");
        Verdict::Proceed
    }

    fn started(&self, worker: &str) {
        info!(worker, "started");
    }

    fn worked(&self, worker: &str, item: Option<&T>, elapsed: Duration) {
        trace!(worker, ?item, elapsed_us = elapsed.as_micros() as u64, "worked");
    }

    fn error(&self, worker: &str, item: Option<&T>, error: &WorkerError) {
        warn!(worker, ?item, error = %error, "worker error");
    }

    fn stopped(&self, worker: &str) {
        info!(worker, "stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_events_in_order() {
        let (listener, events) = ChannelListener::<u32>::new();
        assert_eq!(listener.starting("w"), Verdict::Proceed);
        listener.worked("w", Some(&7), Duration::from_millis(1));
        listener.error("w", None, &WorkerError::WorkPanicked("boom".into()));

        let kinds: Vec<_> = events.try_iter().map(|event| event.kind()).collect();
        assert_eq!(kinds, ["starting", "worked", "error"]);
    }

    #[test]
    fn error_event_carries_message_and_item() {
        let (listener, events) = ChannelListener::new();
        listener.error("w", Some(&"item"), &WorkerError::WorkPanicked("boom".into()));
        let event = events.try_recv().unwrap();
        assert_eq!(event.item(), Some(&"item"));
        match event {
            WorkerEvent::Error { message, .. } => assert_eq!(message, "Work unit panicked: boom"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (listener, events) = ChannelListener::<()>::new();
        drop(events);
        listener.stopped("w");
    }
}

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use foreman_api::{Verdict, WorkerError, WorkerListener};

/// The set of listeners subscribed to one worker.
///
/// Every listener sees every event; for vetoable events all listeners are
/// asked and any `Cancel` wins. Callbacks run while a read lock is held, so
/// a listener must not subscribe further listeners from inside a callback.
pub(crate) struct Listeners<T> {
    inner: RwLock<Vec<Arc<dyn WorkerListener<T>>>>,
}

impl<T> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn WorkerListener<T>>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn ask(&self, ask: impl Fn(&dyn WorkerListener<T>) -> Verdict) -> Verdict {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .fold(Verdict::Proceed, |verdict, listener| {
                verdict.and(ask(listener.as_ref()))
            })
    }

    fn tell(&self, tell: impl Fn(&dyn WorkerListener<T>)) {
        for listener in self.inner.read().unwrap_or_else(PoisonError::into_inner).iter() {
            tell(listener.as_ref());
        }
    }

    pub(crate) fn starting(&self, worker: &str) -> Verdict {
        self.ask(|l| l.starting(worker))
    }

    pub(crate) fn started(&self, worker: &str) {
        self.tell(|l| l.started(worker));
    }

    pub(crate) fn working(&self, worker: &str) -> Verdict {
        self.ask(|l| l.working(worker))
    }

    pub(crate) fn worked(&self, worker: &str, item: Option<&T>, elapsed: Duration) {
        self.tell(|l| l.worked(worker, item, elapsed));
    }

    pub(crate) fn error(&self, worker: &str, item: Option<&T>, error: &WorkerError) {
        self.tell(|l| l.error(worker, item, error));
    }

    pub(crate) fn stopping(&self, worker: &str) -> Verdict {
        self.ask(|l| l.stopping(worker))
    }

    pub(crate) fn stopped(&self, worker: &str) {
        self.tell(|l| l.stopped(worker));
    }
}

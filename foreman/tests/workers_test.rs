// Integration tests for worker collections in foreman::workers

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;

use foreman::{
    routine_fn, stop_in_background, Lifecycle, QueueWorker, Worker, WorkerError, WorkerState,
    Workers,
};

// Mock member that records every lifecycle call in a shared log
struct MockWorker {
    name: String,
    state: Mutex<WorkerState>,
    fail_start: bool,
    fail_stop: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockWorker {
    fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(WorkerState::Stopped),
            fail_start: false,
            fail_stop: false,
            log: Arc::clone(log),
        }
    }

    fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }
}

impl Lifecycle for MockWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    fn start(&self) -> Result<bool, WorkerError> {
        self.log.lock().unwrap().push(format!("{}:start", self.name));
        if self.fail_start {
            return Err(WorkerError::Other(anyhow!("{} refused to start", self.name)));
        }
        *self.state.lock().unwrap() = WorkerState::Idle;
        Ok(true)
    }

    fn stop(&self, timeout: Duration, _force: bool) -> Result<bool, WorkerError> {
        self.log.lock().unwrap().push(format!("{}:stop", self.name));
        *self.state.lock().unwrap() = WorkerState::Stopped;
        if self.fail_stop {
            return Err(WorkerError::StopTimeout { name: self.name.clone(), timeout });
        }
        Ok(true)
    }
}

fn shared_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_failed_member_rolls_back_started_members() {
    let log = shared_log();
    let a = Arc::new(MockWorker::new("A", &log));
    let b = Arc::new(MockWorker::new("B", &log).failing_start());
    let c = Arc::new(MockWorker::new("C", &log));

    let workers = Workers::new("batch");
    workers.add_shared(a.clone());
    workers.add_shared(b.clone());
    workers.add_shared(c.clone());

    assert!(!workers.start().unwrap());
    assert_eq!(*log.lock().unwrap(), ["A:start", "B:start", "A:stop"]);
    assert_eq!(a.state(), WorkerState::Stopped);
    assert!(!b.is_running());
    assert!(!c.is_running());
    assert_eq!(workers.state(), WorkerState::Stopped);

    let failures = workers.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].to_string(), "Internal worker error: B refused to start");
    assert!(workers.take_failures().is_empty());
}

#[test]
fn test_rollback_runs_in_reverse_order() {
    let log = shared_log();
    let workers = Workers::new("reverse");
    workers.add(MockWorker::new("A", &log));
    workers.add(MockWorker::new("B", &log));
    workers.add(MockWorker::new("C", &log).failing_start());

    assert!(!workers.start().unwrap());
    assert_eq!(
        *log.lock().unwrap(),
        ["A:start", "B:start", "C:start", "B:stop", "A:stop"]
    );
}

#[test]
fn test_start_and_stop_all_members() {
    let log = shared_log();
    let workers = Workers::new("all");
    workers.add(MockWorker::new("A", &log));
    workers.add(MockWorker::new("B", &log));

    assert!(workers.start().unwrap());
    assert!(workers.is_running());
    assert!(workers.stop(Duration::from_secs(1), false).unwrap());
    assert_eq!(
        *log.lock().unwrap(),
        ["A:start", "B:start", "B:stop", "A:stop"]
    );
    assert_eq!(workers.state(), WorkerState::Stopped);
}

#[test]
fn test_stop_attempts_every_member_and_aggregates() {
    let log = shared_log();
    let workers = Workers::new("aggregate");
    workers.add(MockWorker::new("A", &log).failing_stop());
    workers.add(MockWorker::new("B", &log));
    workers.add(MockWorker::new("C", &log).failing_stop());

    workers.start().unwrap();
    match workers.stop(Duration::from_millis(100), false) {
        Err(WorkerError::Aggregate(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.iter().all(|e| matches!(e, WorkerError::StopTimeout { .. })));
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }
    let log = log.lock().unwrap();
    assert_eq!(log[3..], ["C:stop", "B:stop", "A:stop"]);
    assert_eq!(workers.state(), WorkerState::Stopped);
}

#[test]
fn test_lifecycle_errors() {
    let workers = Workers::new("guarded");
    assert!(matches!(
        workers.stop(Duration::from_secs(1), false),
        Err(WorkerError::InvalidState { .. })
    ));

    assert!(workers.start().unwrap());
    assert!(matches!(workers.start(), Err(WorkerError::InvalidState { .. })));
    assert!(workers.stop(Duration::from_secs(1), false).unwrap());
}

#[test]
fn test_real_workers_in_collection() {
    let workers = Workers::new("pipeline").with_rollback_timeout(Duration::from_secs(1));
    workers.add(Worker::new("ticker", routine_fn(|ctx| {
        ctx.sleep(Duration::from_millis(1));
        Ok(())
    })));
    workers.add(QueueWorker::new("sink", |_item: &u32| -> anyhow::Result<()> { Ok(()) }));

    assert_eq!(workers.names(), ["ticker", "sink"]);
    assert_eq!(workers.len(), 2);
    assert!(workers.start().unwrap());
    assert!(workers.stop(Duration::from_secs(1), false).unwrap());
}

#[test]
fn test_collections_nest() {
    let log = shared_log();
    let inner = Workers::new("inner");
    inner.add(MockWorker::new("A", &log));
    let outer = Workers::new("outer");
    outer.add(inner);
    outer.add(MockWorker::new("B", &log).failing_start());

    assert!(!outer.start().unwrap());
    assert_eq!(*log.lock().unwrap(), ["A:start", "B:start", "A:stop"]);
}

#[tokio::test]
async fn test_stop_in_background() {
    let worker = Arc::new(Worker::new("async-host", routine_fn(|ctx| {
        ctx.sleep(Duration::from_millis(1));
        Ok(())
    })));
    worker.start().unwrap();

    let stopped = stop_in_background(Arc::clone(&worker), Duration::from_secs(1), false)
        .await
        .unwrap();
    assert!(stopped);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn test_stop_in_background_reports_errors() {
    let workers: Arc<dyn Lifecycle> = Arc::new(Workers::new("never-started"));
    let result = stop_in_background(workers, Duration::from_secs(1), false).await;
    assert!(matches!(result, Err(WorkerError::InvalidState { .. })));
}

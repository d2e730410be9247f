// Integration tests for queue-driven workers in foreman::queue

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use flume::Receiver;

use foreman::{
    BackpressureStrategy, ChannelListener, FifoQueue, PriorityQueue, QueueConfig, QueueError,
    QueueWorker, RingQueue, WorkerConfig, WorkerEvent, WorkerState,
};

const WAIT: Duration = Duration::from_secs(5);

// Collects the items of `count` worked events
fn worked_items<T>(events: &Receiver<WorkerEvent<T>>, count: usize) -> Vec<T> {
    let deadline = Instant::now() + WAIT;
    let mut items = Vec::with_capacity(count);
    while items.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(WorkerEvent::Worked { item: Some(item), .. }) => items.push(item),
            Ok(_) => {}
            Err(_) => panic!("only {} of {count} items worked within {WAIT:?}", items.len()),
        }
    }
    items
}

fn idle_config(millis: u64) -> WorkerConfig {
    WorkerConfig::default().with_idle_wait(Duration::from_millis(millis))
}

#[test]
fn test_items_worked_in_order_then_stopped() {
    let worker = QueueWorker::with_config(
        "ordered-queue",
        |_item: &u32| -> anyhow::Result<()> { Ok(()) },
        FifoQueue::unbounded(),
        idle_config(50),
        QueueConfig::default(),
    )
    .unwrap();
    let (listener, events) = ChannelListener::new();
    worker.subscribe(listener);
    worker.start().unwrap();

    let started = Instant::now();
    worker.extend([1, 2, 3]).unwrap();
    assert_eq!(worked_items(&events, 3), vec![1, 2, 3]);
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(worker.stop(Duration::from_secs(1), true).unwrap());
    thread::sleep(Duration::from_millis(100));
    assert!(events
        .try_iter()
        .all(|event| !matches!(event, WorkerEvent::Worked { .. })));
}

#[test]
fn test_concurrent_producers_lose_nothing() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 250;

    let worker = QueueWorker::new("fan-in", |_item: &u32| -> anyhow::Result<()> { Ok(()) });
    let (listener, events) = ChannelListener::new();
    worker.subscribe(listener);
    worker.start().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sender = worker.sender();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    sender.enqueue(p * 10_000 + i).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    let items = worked_items(&events, total);
    let distinct: HashSet<_> = items.iter().copied().collect();
    assert_eq!(distinct.len(), total);

    assert!(worker.stop(Duration::from_secs(1), false).unwrap());
    assert!(events
        .try_iter()
        .all(|event| !matches!(event, WorkerEvent::Worked { .. })));
}

#[test]
fn test_handler_errors_carry_the_item() {
    let worker = QueueWorker::new("picky", |item: &u32| -> anyhow::Result<()> {
        if item % 2 == 1 {
            bail!("odd item {item}");
        }
        Ok(())
    });
    let (listener, events) = ChannelListener::new();
    worker.subscribe(listener);
    worker.start().unwrap();
    worker.extend(0..4).unwrap();

    let deadline = Instant::now() + WAIT;
    let mut failed = Vec::new();
    let mut worked = Vec::new();
    while failed.len() + worked.len() < 4 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining).unwrap() {
            WorkerEvent::Worked { item: Some(item), .. } => worked.push(item),
            WorkerEvent::Error { item: Some(item), message, .. } => {
                assert_eq!(message, format!("Work unit failed: odd item {item}"));
                failed.push(item);
            }
            _ => {}
        }
    }
    assert_eq!(worked, vec![0, 2]);
    assert_eq!(failed, vec![1, 3]);
    assert!(worker.state().is_running());
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_error_backpressure_rejects_when_full() {
    let worker = QueueWorker::with_config(
        "bounded",
        |_item: &u32| -> anyhow::Result<()> { Ok(()) },
        FifoQueue::bounded(2),
        WorkerConfig::default(),
        QueueConfig::default().with_backpressure(BackpressureStrategy::Error),
    )
    .unwrap();

    worker.enqueue(1).unwrap();
    worker.enqueue(2).unwrap();
    assert_eq!(worker.enqueue(3), Err(QueueError::Full { capacity: 2 }));
    assert_eq!(worker.len(), 2);
}

#[test]
fn test_block_backpressure_waits_for_room() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let worker = QueueWorker::with_config(
        "throttled",
        move |_item: &u32| -> anyhow::Result<()> {
            thread::sleep(Duration::from_millis(2));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        RingQueue::new(1),
        idle_config(10),
        QueueConfig::default(),
    )
    .unwrap();
    worker.start().unwrap();

    for i in 0..10 {
        worker.enqueue(i).unwrap();
    }
    assert!(worker.flush(WAIT));
    assert_eq!(handled.load(Ordering::SeqCst), 10);
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_flush_waits_for_in_flight_item() {
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let worker = QueueWorker::new("flusher", move |_item: &u32| -> anyhow::Result<()> {
        thread::sleep(Duration::from_millis(5));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    worker.start().unwrap();
    worker.extend(0..10).unwrap();

    assert!(worker.flush(WAIT));
    assert!(worker.is_empty());
    assert_eq!(handled.load(Ordering::SeqCst), 10);
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_flush_on_stopped_worker() {
    let worker = QueueWorker::new("parked", |_item: &u32| -> anyhow::Result<()> { Ok(()) });
    assert!(worker.flush(Duration::from_millis(10)));

    worker.enqueue(1).unwrap();
    assert!(!worker.flush(Duration::from_millis(10)));
    assert_eq!(worker.len(), 1);
}

#[test]
fn test_snapshot_does_not_dequeue() {
    let worker = QueueWorker::new("snapshot", |_item: &String| -> anyhow::Result<()> { Ok(()) });
    worker
        .extend(["a", "b", "c"].map(String::from))
        .unwrap();

    assert_eq!(worker.snapshot(), vec!["a", "b", "c"]);
    assert_eq!(worker.len(), 3);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[test]
fn test_items_queued_before_start_are_processed() {
    let worker = QueueWorker::new("backlog", |_item: &u32| -> anyhow::Result<()> { Ok(()) });
    let (listener, events) = ChannelListener::new();
    worker.subscribe(listener);
    worker.extend([7, 8]).unwrap();

    worker.start().unwrap();
    assert_eq!(worked_items(&events, 2), vec![7, 8]);
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_priority_queue_worker() {
    let worker = QueueWorker::with_queue(
        "prioritised",
        |_item: &u32| -> anyhow::Result<()> { Ok(()) },
        PriorityQueue::unbounded(),
    );
    let (listener, events) = ChannelListener::new();
    worker.subscribe(listener);
    worker.extend([3, 9, 1]).unwrap();
    assert_eq!(worker.snapshot(), vec![9, 3, 1]);

    worker.start().unwrap();
    assert_eq!(worked_items(&events, 3), vec![9, 3, 1]);
    worker.stop(Duration::from_secs(1), false).unwrap();
}

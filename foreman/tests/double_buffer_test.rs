// Integration tests for the double-buffered hand-off in foreman::double_buffer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::bail;

use foreman::{
    ChannelListener, DoubleBufferWorker, WorkerConfig, WorkerError, WorkerEvent, WorkerState,
};

const SENTINEL: u64 = u64::MAX;

// Fills each buffer with the number of the fill
fn numbered() -> impl FnMut(&mut Vec<u64>) -> anyhow::Result<()> + Send + 'static {
    let mut generation = 0u64;
    move |buffer: &mut Vec<u64>| {
        generation += 1;
        buffer.clear();
        buffer.extend(std::iter::repeat(generation).take(64));
        Ok(())
    }
}

#[test]
fn test_read_requires_running_worker() {
    let mut worker = DoubleBufferWorker::new("idle-buffers", [Vec::<u64>::new(), Vec::new()], numbered());
    let error = worker.read_next_buffer().unwrap_err();
    assert!(matches!(error, WorkerError::InvalidState { operation: "read", .. }));
}

#[test]
fn test_buffers_arrive_in_fill_order() {
    let mut worker = DoubleBufferWorker::new("ordered-buffers", [Vec::<u64>::new(), Vec::new()], numbered());
    worker.start().unwrap();

    for expected in 1..=5u64 {
        let buffer = worker.read_next_buffer().unwrap();
        assert_eq!(buffer.len(), 64);
        assert!(buffer.iter().all(|value| *value == expected));
    }
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_returned_buffer_untouched_until_next_read() {
    let fills = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fills);
    let mut worker = DoubleBufferWorker::new(
        "sentinel",
        [vec![0u64; 8], vec![0u64; 8]],
        move |buffer: &mut Vec<u64>| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            buffer.iter_mut().for_each(|value| *value = 1);
            Ok(())
        },
    );
    worker.start().unwrap();

    for _ in 0..5 {
        let buffer = worker.read_next_buffer().unwrap();
        assert!(buffer.iter().all(|value| *value == 1));

        worker.current_mut().unwrap().fill(SENTINEL);
        // Give the worker time to run several fills if it could reach this buffer.
        thread::sleep(Duration::from_millis(30));
        assert!(worker.current().unwrap().iter().all(|value| *value == SENTINEL));
    }
    // One fill per read plus the prefetch.
    assert!(fills.load(Ordering::SeqCst) <= 6);
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_fill_failure_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let mut worker = DoubleBufferWorker::with_config(
        "flaky-fill",
        [0u32, 0u32],
        move |buffer: &mut u32| -> anyhow::Result<()> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                bail!("source not ready");
            }
            *buffer = 42;
            Ok(())
        },
        WorkerConfig::default().with_idle_wait(Duration::from_millis(10)),
    )
    .unwrap();
    let (listener, events) = ChannelListener::new();
    worker.subscribe(listener);
    worker.start().unwrap();

    assert_eq!(*worker.read_next_buffer().unwrap(), 42);
    assert!(attempts.load(Ordering::SeqCst) >= 2);
    let error = events
        .try_iter()
        .find(|event| matches!(event, WorkerEvent::Error { .. }))
        .expect("error event for the failed fill");
    assert_eq!(error.worker(), "flaky-fill");
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_try_read_times_out_and_recovers() {
    let mut worker = DoubleBufferWorker::with_config(
        "slow-fill",
        [0u8, 0u8],
        |buffer: &mut u8| -> anyhow::Result<()> {
            thread::sleep(Duration::from_millis(150));
            *buffer = 7;
            Ok(())
        },
        WorkerConfig::default().with_idle_wait(Duration::from_millis(10)),
    )
    .unwrap();
    worker.start().unwrap();

    let error = worker.try_read_next_buffer(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(error, WorkerError::Timeout { timeout, .. } if timeout == Duration::from_millis(20)));

    // The fill that was pending is still delivered.
    assert_eq!(*worker.try_read_next_buffer(Duration::from_secs(2)).unwrap(), 7);
    worker.stop(Duration::from_secs(1), false).unwrap();
}

#[test]
fn test_read_fails_once_worker_stops() {
    let mut worker =
        DoubleBufferWorker::new("stopping-buffers", [0u8, 0u8], |_: &mut u8| -> anyhow::Result<()> {
            Ok(())
        });
    worker.start().unwrap();
    worker.read_next_buffer().unwrap();
    worker.stop(Duration::from_secs(1), false).unwrap();

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(matches!(worker.read_next_buffer(), Err(WorkerError::InvalidState { .. })));
    // The last buffer handed out stays with the consumer.
    assert!(worker.current().is_some());
}

use foreman_api::errors::{QueueError, WorkerError};
use foreman_api::WorkerState;
use std::error::Error;
use std::time::Duration;
use anyhow::anyhow;

#[cfg(test)]
mod tests {
    use super::*;

    // Test invalid state error
    #[test]
    fn test_invalid_state_error() {
        let error = WorkerError::invalid_state("ingest", "start", WorkerState::Idle);

        assert_eq!(error.to_string(), "Worker ingest cannot start while idle");
        assert!(error.source().is_none());
        assert!(matches!(
            error,
            WorkerError::InvalidState { operation: "start", state: WorkerState::Idle, .. }
        ));
    }

    // Test configuration errors
    #[test]
    fn test_configuration_errors() {
        let error = WorkerError::OutOfRange("timer interval must be greater than zero".to_string());
        assert_eq!(
            error.to_string(),
            "Value out of range: timer interval must be greater than zero"
        );

        let error = WorkerError::InvalidConfig("stack size must be greater than zero".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: stack size must be greater than zero"
        );
    }

    // Test spawn failure keeps the io error as source
    #[test]
    fn test_spawn_failed_error() {
        let error = WorkerError::SpawnFailed {
            name: "ingest".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads left"),
        };

        assert_eq!(
            error.to_string(),
            "Failed to spawn thread for worker ingest: no threads left"
        );
        assert!(error.source().is_some());
    }

    // Test timeout errors
    #[test]
    fn test_timeout_errors() {
        let error = WorkerError::StopTimeout {
            name: "ingest".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(error.to_string(), "Worker ingest did not stop within 250ms");

        let error = WorkerError::Timeout {
            name: "reader".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(error.to_string(), "Worker reader timed out after 1s");
    }

    // Test lifecycle conflict errors
    #[test]
    fn test_lifecycle_conflict_errors() {
        let error = WorkerError::ThreadStillRunning { name: "ingest".to_string() };
        assert_eq!(
            error.to_string(),
            "Worker ingest still has an abandoned thread running"
        );

        let error = WorkerError::Vetoed { name: "ingest".to_string(), operation: "start" };
        assert_eq!(error.to_string(), "Worker ingest: start was vetoed by a listener");
    }

    // Test work unit errors
    #[test]
    fn test_work_unit_errors() {
        let error = WorkerError::WorkFailed(anyhow!("disk full"));
        assert_eq!(error.to_string(), "Work unit failed: disk full");
        assert!(error.source().is_some());

        let error = WorkerError::WorkPanicked("index out of bounds".to_string());
        assert_eq!(error.to_string(), "Work unit panicked: index out of bounds");
    }

    // Test aggregate error counts its members
    #[test]
    fn test_aggregate_error() {
        let error = WorkerError::Aggregate(vec![
            WorkerError::WorkPanicked("a".to_string()),
            WorkerError::ThreadStillRunning { name: "b".to_string() },
        ]);

        assert_eq!(error.to_string(), "2 worker operation(s) failed");
        match error {
            WorkerError::Aggregate(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    // Test conversion from anyhow
    #[test]
    fn test_from_anyhow() {
        let error: WorkerError = anyhow!("lock poisoned").into();
        assert!(matches!(error, WorkerError::Other(_)));
        assert_eq!(error.to_string(), "Internal worker error: lock poisoned");
    }

    // Test queue errors
    #[test]
    fn test_queue_full_error() {
        let error = QueueError::Full { capacity: 16 };
        assert_eq!(error.to_string(), "Queue is full (capacity: 16)");
        assert_eq!(error.clone(), QueueError::Full { capacity: 16 });
    }
}

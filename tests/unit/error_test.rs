//! Tests for error types

use fleet_agent::core::SchedulerError;

#[test]
fn test_duplicate_task_error() {
    let err = SchedulerError::DuplicateTask("t-1".to_string());
    assert_eq!(format!("{}", err), "task t-1 already in queue");
}

#[test]
fn test_duplicates_skipped_error_joins_reasons() {
    let err = SchedulerError::DuplicatesSkipped(vec![
        "task a already in queue".to_string(),
        "task b already in queue".to_string(),
    ]);
    assert_eq!(
        format!("{}", err),
        "enqueue errors: task a already in queue; task b already in queue"
    );
}

#[test]
fn test_retry_exhausted_error() {
    let err = SchedulerError::RetryExhausted("connection refused".to_string());
    assert_eq!(format!("{}", err), "max retries reached: connection refused");
}

#[test]
fn test_permanent_error() {
    let err = SchedulerError::PermanentError("access denied".to_string());
    assert_eq!(format!("{}", err), "permanent error: access denied");
}

#[test]
fn test_backoff_active_error() {
    assert_eq!(
        format!("{}", SchedulerError::BackoffActive),
        "still in backoff period"
    );
}

#[test]
fn test_cancelled_and_closed_errors() {
    assert_eq!(format!("{}", SchedulerError::Cancelled), "scheduler cancelled");
    assert_eq!(
        format!("{}", SchedulerError::ControllerClosed),
        "admission controller closed"
    );
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("maxConcurrentTasks must be positive".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: maxConcurrentTasks must be positive"
    );
}

#[test]
fn test_error_converts_into_anyhow() {
    fn fails() -> fleet_agent::core::AppResult<()> {
        Err::<(), _>(SchedulerError::BackoffActive)?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}

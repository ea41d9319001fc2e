//! Tests for loop and execution metrics

use fleet_agent::core::{AgentMetrics, ErrorCategory, ExecutionMetrics, LastStatus, LoopMetrics};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    let metrics = Arc::new(AgentMetrics::new());

    let mut handles = Vec::new();
    for _ in 0..100 {
        let m = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            m.loop_metrics.record_heartbeat_success();
            m.execution.record_backoff();
            m.execution.record_retry(ErrorCategory::Network);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let snap = metrics.snapshot(None);
    assert_eq!(snap.loop_metrics.heartbeats_sent, 100);
    assert_eq!(snap.execution.backoff_events, 100);
    assert_eq!(snap.execution.retries_network, 100);
}

#[test]
fn test_concurrent_increments_from_threads() {
    let metrics = Arc::new(LoopMetrics::new());
    let threads: Vec<_> = (0..100)
        .map(|_| {
            let m = Arc::clone(&metrics);
            std::thread::spawn(move || {
                m.record_iteration_start();
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(metrics.loop_count(), 100);
}

#[test]
fn test_counters_start_at_zero() {
    let snap = ExecutionMetrics::new().snapshot();
    assert_eq!(snap.backoff_events, 0);
    assert_eq!(snap.permanent_failures, 0);
    assert_eq!(snap.exhausted_tasks, 0);
    assert_eq!(snap.admission_limit_reached, 0);
    assert_eq!(snap.quota_exceeded, 0);
    assert_eq!(snap.tasks_completed, 0);
    assert!(snap.success_rate.abs() < f64::EPSILON);
}

#[test]
fn test_heartbeat_error_records_last_error() {
    let m = LoopMetrics::new();
    m.record_heartbeat_success();
    m.record_heartbeat_error("connection refused");

    let snap = m.snapshot();
    assert_eq!(snap.heartbeats_sent, 1);
    assert_eq!(snap.heartbeat_errors, 1);
    assert_eq!(snap.total_errors, 1);
    assert_eq!(snap.last_heartbeat_status, LastStatus::Error);
    assert_eq!(snap.last_error.as_deref(), Some("connection refused"));
    assert!(snap.last_error_at.is_some());
}

#[test]
fn test_snapshot_is_independent_copy() {
    let m = AgentMetrics::new();
    m.loop_metrics.record_iteration_start();
    m.loop_metrics.record_iteration_duration(Duration::from_millis(40));
    let before = m.snapshot(None);

    m.loop_metrics.record_iteration_start();
    assert_eq!(before.loop_metrics.loop_count, 1);
    assert_eq!(before.loop_metrics.average_loop_duration_ms, 40);
}

#[test]
fn test_snapshot_serializes_status_strings() {
    let m = AgentMetrics::new();
    m.loop_metrics.record_tasks_fetched(0);
    let json = serde_json::to_value(m.snapshot(None)).unwrap();
    assert_eq!(json["loop"]["lastFetchStatus"], "empty");
    assert_eq!(json["loop"]["lastHeartbeatStatus"], "never");
}

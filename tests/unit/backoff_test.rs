//! Tests for backoff delays and retry decisions

use chrono::{TimeDelta, Utc};
use fleet_agent::core::{
    compute_delay, next_retry_at, record_failure, reset_on_success, should_retry,
    should_retry_at, RetryDecision, RetryRecord, SchedulerError,
};
use std::time::Duration;

const BASE: Duration = Duration::from_secs(5);
const MAX: Duration = Duration::from_secs(60);

#[test]
fn test_delay_monotonic_until_cap() {
    let mut prev = Duration::ZERO;
    for attempt in 1..=20 {
        let d = compute_delay(attempt, BASE, MAX, 0.0);
        assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
        assert!(d <= MAX);
        prev = d;
    }
    assert_eq!(prev, MAX);
}

#[test]
fn test_delay_huge_attempt_saturates() {
    assert_eq!(compute_delay(u32::MAX, BASE, MAX, 0.0), MAX);
}

#[test]
fn test_jitter_bounds_hold() {
    let j = 0.25;
    for attempt in 1..=6 {
        let value = compute_delay(attempt, BASE, MAX, 0.0).as_secs_f64();
        for _ in 0..200 {
            let d = compute_delay(attempt, BASE, MAX, j).as_secs_f64();
            assert!(d >= (value * (1.0 - j)).max(0.0) - 1e-6);
            assert!(d <= value * (1.0 + j) + 1e-6);
        }
    }
}

#[test]
fn test_next_retry_at_is_now_plus_delay() {
    let now = Utc::now();
    let at = next_retry_at(2, BASE, MAX, 0.0, now);
    assert_eq!(at - now, TimeDelta::seconds(10));
}

#[test]
fn test_exhaustion_beats_permanence_and_window() {
    let record = RetryRecord {
        attempt_count: 3,
        max_attempts: 3,
        last_error: "permission denied".into(),
        next_retry_at: Some(Utc::now() + TimeDelta::hours(1)),
    };
    let decision = should_retry(&record);
    assert_eq!(decision, RetryDecision::MaxRetriesReached);
    assert!(!decision.should_retry());
    assert_eq!(decision.reason(), "max retries reached");
    assert!(matches!(
        decision.into_error(&record),
        Some(SchedulerError::RetryExhausted(_))
    ));
}

#[test]
fn test_permanence_beats_window() {
    for phrase in [
        "Permission Denied",
        "ACCESS DENIED",
        "401 Unauthorized",
        "403 forbidden",
        "repo Not Found",
        "Invalid Repository format",
        "Authentication Failed for user",
    ] {
        let record = RetryRecord {
            attempt_count: 1,
            max_attempts: 5,
            last_error: phrase.into(),
            next_retry_at: Some(Utc::now() + TimeDelta::hours(1)),
        };
        assert_eq!(should_retry(&record).reason(), "permanent error", "{phrase}");
    }
}

#[test]
fn test_window_then_eligible() {
    let now = Utc::now();
    let record = RetryRecord {
        attempt_count: 1,
        max_attempts: 3,
        last_error: "connection reset".into(),
        next_retry_at: Some(now + TimeDelta::seconds(5)),
    };
    assert_eq!(should_retry_at(&record, now), RetryDecision::BackoffActive);
    assert_eq!(
        should_retry_at(&record, now + TimeDelta::seconds(6)),
        RetryDecision::Retry
    );
    assert_eq!(should_retry_at(&record, now + TimeDelta::seconds(6)).reason(), "");
}

#[test]
fn test_failure_then_reset() {
    let record = reset_on_success(3);
    let record = record_failure(&record, "timeout", BASE, MAX, 0.0);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(record.last_error, "timeout");
    assert!(record.next_retry_at.is_some());

    let fresh = reset_on_success(record.max_attempts);
    assert_eq!(fresh.attempt_count, 0);
    assert!(fresh.last_error.is_empty());
    assert!(fresh.next_retry_at.is_none());
}

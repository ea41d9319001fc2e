//! Retry backoff and failure classification.
//!
//! The delay for retry attempt `n` (1-based) is `base × 2^(n-1)`, capped at
//! `max`, then optionally perturbed by a symmetric jitter of `±jitter × value`
//! and floored at zero. Attempt `0` returns `base` unmodified.
//!
//! [`should_retry`] evaluates a [`RetryRecord`] with fixed precedence:
//! exhaustion, then permanence, then the backoff window.
//!
//! ```rust
//! use std::time::Duration;
//! use fleet_agent::core::compute_delay;
//!
//! let base = Duration::from_secs(5);
//! let max = Duration::from_secs(60);
//! assert_eq!(compute_delay(1, base, max, 0.0), Duration::from_secs(5));
//! assert_eq!(compute_delay(3, base, max, 0.0), Duration::from_secs(20));
//! assert_eq!(compute_delay(10, base, max, 0.0), Duration::from_secs(60));
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Phrases that mark an error as permanent (matched case-insensitively).
pub const PERMANENT_ERRORS: [&str; 7] = [
    "permission denied",
    "access denied",
    "unauthorized",
    "forbidden",
    "not found",
    "invalid repository",
    "authentication failed",
];

/// Compute the backoff delay for a retry attempt.
pub fn compute_delay(attempt: u32, base: Duration, max: Duration, jitter: f64) -> Duration {
    if attempt == 0 {
        return base;
    }

    let backoff = 1u32
        .checked_shl(attempt - 1)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |d| d.min(max));

    if jitter > 0.0 {
        apply_jitter(backoff, jitter)
    } else {
        backoff
    }
}

/// Perturb `value` by a uniform offset in `[-jitter, +jitter] × value`.
fn apply_jitter(value: Duration, jitter: f64) -> Duration {
    let nanos = value.as_nanos() as f64;
    let offset = rand::rng().random_range(-1.0..=1.0) * jitter * nanos;
    let jittered = (nanos + offset).max(0.0);
    Duration::from_nanos(jittered as u64)
}

/// Instant at which the next retry becomes eligible.
pub fn next_retry_at(
    retry_count: u32,
    base: Duration,
    max: Duration,
    jitter: f64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    instant_after(now, compute_delay(retry_count, base, max, jitter))
}

fn instant_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether an error text matches the permanent-error vocabulary.
pub fn is_permanent_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    PERMANENT_ERRORS.iter().any(|p| lower.contains(p))
}

/// Per-task retry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
    /// Failed attempts so far.
    #[serde(rename = "retryCount")]
    pub attempt_count: u32,
    /// Attempts allowed before giving up.
    #[serde(rename = "maxRetries")]
    pub max_attempts: u32,
    /// Text of the most recent failure.
    #[serde(rename = "lastError")]
    pub last_error: String,
    /// Earliest instant the next attempt may start.
    #[serde(rename = "nextRetryAt")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RetryRecord {
    /// Fresh record for a new task or after a success.
    pub const fn reset_on_success(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            last_error: String::new(),
            next_retry_at: None,
        }
    }
}

/// Fresh record with no failures.
pub const fn reset_on_success(max_attempts: u32) -> RetryRecord {
    RetryRecord::reset_on_success(max_attempts)
}

/// Outcome of [`should_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The task may be attempted now.
    Retry,
    /// Attempt count reached the maximum.
    MaxRetriesReached,
    /// Last error is in the permanent vocabulary.
    PermanentError,
    /// The backoff window has not elapsed yet.
    BackoffActive,
}

impl RetryDecision {
    /// Whether the caller may attempt the task now.
    pub const fn should_retry(self) -> bool {
        matches!(self, Self::Retry)
    }

    /// Whether the task must be given up for good.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::MaxRetriesReached | Self::PermanentError)
    }

    /// Reason string; empty when retrying is permitted.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Retry => "",
            Self::MaxRetriesReached => "max retries reached",
            Self::PermanentError => "permanent error",
            Self::BackoffActive => "still in backoff period",
        }
    }

    /// Map a refusal onto the scheduler error taxonomy.
    pub fn into_error(self, record: &RetryRecord) -> Option<SchedulerError> {
        match self {
            Self::Retry => None,
            Self::MaxRetriesReached => {
                Some(SchedulerError::RetryExhausted(record.last_error.clone()))
            }
            Self::PermanentError => Some(SchedulerError::PermanentError(record.last_error.clone())),
            Self::BackoffActive => Some(SchedulerError::BackoffActive),
        }
    }
}

/// Decide whether a task may be retried now.
pub fn should_retry(record: &RetryRecord) -> RetryDecision {
    should_retry_at(record, Utc::now())
}

/// Decide whether a task may be retried at `now`.
pub fn should_retry_at(record: &RetryRecord, now: DateTime<Utc>) -> RetryDecision {
    if record.attempt_count >= record.max_attempts {
        tracing::debug!(
            retry_count = record.attempt_count,
            max_retries = record.max_attempts,
            "retries exhausted"
        );
        return RetryDecision::MaxRetriesReached;
    }
    if is_permanent_error(&record.last_error) {
        tracing::debug!(error = %record.last_error, "permanent failure detected");
        return RetryDecision::PermanentError;
    }
    if record.next_retry_at.is_some_and(|at| now < at) {
        return RetryDecision::BackoffActive;
    }
    RetryDecision::Retry
}

/// Record a failure: bump the attempt count, store the error and schedule the
/// next eligible retry.
pub fn record_failure(
    record: &RetryRecord,
    error: &str,
    base: Duration,
    max: Duration,
    jitter: f64,
) -> RetryRecord {
    let delay = compute_delay(record.attempt_count.saturating_add(1), base, max, jitter);
    failed_record(record, error, delay)
}

fn failed_record(record: &RetryRecord, error: &str, delay: Duration) -> RetryRecord {
    let attempt_count = record.attempt_count.saturating_add(1);
    let next = instant_after(Utc::now(), delay);

    tracing::warn!(
        retry = attempt_count,
        max_retries = record.max_attempts,
        next_retry = %next.to_rfc3339(),
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        error = %error,
        "task entering backoff"
    );

    RetryRecord {
        attempt_count,
        max_attempts: record.max_attempts,
        last_error: error.to_string(),
        next_retry_at: Some(next),
    }
}

/// Backoff parameters bundled for callers that retry many tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any delay before jitter.
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        compute_delay(attempt, self.base_delay, self.max_delay, self.jitter)
    }

    /// Record a failure using this policy's parameters.
    pub fn record_failure(&self, record: &RetryRecord, error: &str) -> RetryRecord {
        self.record_failure_with_delay(record, error).0
    }

    /// Like [`record_failure`](Self::record_failure), also returning the delay
    /// that `next_retry_at` was computed from.
    pub fn record_failure_with_delay(
        &self,
        record: &RetryRecord,
        error: &str,
    ) -> (RetryRecord, Duration) {
        let delay = self.delay(record.attempt_count.saturating_add(1));
        (failed_record(record, error, delay), delay)
    }
}

/// Coarse classification of an execution error, used for retry metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity problems and timeouts.
    Network,
    /// Locks, disk space, quotas and other local resource contention.
    Resource,
    /// Authentication and authorization failures.
    Auth,
    /// Missing or invalid repositories and other unrecoverable failures.
    Permanent,
    /// Anything not matched above.
    Transient,
}

const NETWORK_ERRORS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "no route to host",
    "network is unreachable",
];

const RESOURCE_ERRORS: &[&str] = &[
    "already locked",
    "temporarily unavailable",
    "no space left",
    "quota exceeded",
    "out of memory",
];

const AUTH_ERRORS: &[&str] = &[
    "unauthorized",
    "authentication failed",
    "forbidden",
    "permission denied",
    "access denied",
];

const MISSING_ERRORS: &[&str] = &["not found", "does not exist", "invalid repository"];

impl ErrorCategory {
    /// Classify an error message.
    pub fn classify(error: &str) -> Self {
        let lower = error.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(NETWORK_ERRORS) {
            Self::Network
        } else if has(RESOURCE_ERRORS) {
            Self::Resource
        } else if has(AUTH_ERRORS) {
            Self::Auth
        } else if has(MISSING_ERRORS) {
            Self::Permanent
        } else {
            Self::Transient
        }
    }
}

//! Loop and execution metrics.
//!
//! [`LoopMetrics`] keeps status strings and timestamps next to its counters, so
//! it sits behind one `parking_lot::Mutex`. [`ExecutionMetrics`] is counters
//! only and uses atomics. Both hand out immutable, serializable snapshots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{AdmissionController, ErrorCategory, LoadSnapshot};

/// Outcome of the most recent heartbeat or fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastStatus {
    /// Not attempted yet.
    #[default]
    Never,
    /// Completed successfully.
    Success,
    /// Fetch succeeded but returned no tasks.
    Empty,
    /// Failed.
    Error,
}

impl LastStatus {
    /// Status as reported to operators.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Success => "success",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct LoopState {
    loop_count: u64,
    last_loop_at: Option<DateTime<Utc>>,
    tasks_fetched: u64,
    heartbeats_sent: u64,
    total_errors: u64,
    heartbeat_errors: u64,
    fetch_errors: u64,
    last_heartbeat_status: LastStatus,
    last_fetch_status: LastStatus,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    total_duration: Duration,
    average_duration: Duration,
}

/// Polling loop counters and last-status bookkeeping.
#[derive(Default)]
pub struct LoopMetrics {
    state: Mutex<LoopState>,
}

/// Point-in-time copy of [`LoopMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSnapshot {
    /// Iterations started.
    pub loop_count: u64,
    /// When the latest iteration started.
    pub last_loop_at: Option<DateTime<Utc>>,
    /// Tasks returned by successful fetches.
    pub tasks_fetched: u64,
    /// Heartbeats delivered.
    pub heartbeats_sent: u64,
    /// Heartbeat plus fetch failures.
    pub total_errors: u64,
    /// Failed heartbeats.
    pub heartbeat_errors: u64,
    /// Failed fetches.
    pub fetch_errors: u64,
    /// Outcome of the latest heartbeat.
    pub last_heartbeat_status: LastStatus,
    /// Outcome of the latest fetch.
    pub last_fetch_status: LastStatus,
    /// Text of the latest error.
    pub last_error: Option<String>,
    /// When the latest error was recorded.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Mean iteration duration in milliseconds.
    pub average_loop_duration_ms: u64,
}

impl LoopMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new iteration and stamp its start. Returns the iteration number.
    pub fn record_iteration_start(&self) -> u64 {
        let mut s = self.state.lock();
        s.loop_count += 1;
        s.last_loop_at = Some(Utc::now());
        s.loop_count
    }

    /// Fold an iteration's duration into the running average.
    pub fn record_iteration_duration(&self, elapsed: Duration) {
        let mut s = self.state.lock();
        s.total_duration += elapsed;
        let count = u32::try_from(s.loop_count.max(1)).unwrap_or(u32::MAX);
        s.average_duration = s.total_duration / count;
    }

    /// A heartbeat was delivered.
    pub fn record_heartbeat_success(&self) {
        let mut s = self.state.lock();
        s.heartbeats_sent += 1;
        s.last_heartbeat_status = LastStatus::Success;
    }

    /// A heartbeat failed.
    pub fn record_heartbeat_error(&self, error: &str) {
        let mut s = self.state.lock();
        s.heartbeat_errors += 1;
        s.total_errors += 1;
        s.last_heartbeat_status = LastStatus::Error;
        s.last_error = Some(error.to_string());
        s.last_error_at = Some(Utc::now());
    }

    /// A fetch returned `count` tasks; zero records an "empty" status.
    pub fn record_tasks_fetched(&self, count: usize) {
        let mut s = self.state.lock();
        s.tasks_fetched += count as u64;
        s.last_fetch_status = if count == 0 {
            LastStatus::Empty
        } else {
            LastStatus::Success
        };
    }

    /// A fetch failed.
    pub fn record_fetch_error(&self, error: &str) {
        let mut s = self.state.lock();
        s.fetch_errors += 1;
        s.total_errors += 1;
        s.last_fetch_status = LastStatus::Error;
        s.last_error = Some(error.to_string());
        s.last_error_at = Some(Utc::now());
    }

    /// Iterations started so far.
    pub fn loop_count(&self) -> u64 {
        self.state.lock().loop_count
    }

    /// Copy every field under one lock acquisition.
    pub fn snapshot(&self) -> LoopSnapshot {
        let s = self.state.lock();
        LoopSnapshot {
            loop_count: s.loop_count,
            last_loop_at: s.last_loop_at,
            tasks_fetched: s.tasks_fetched,
            heartbeats_sent: s.heartbeats_sent,
            total_errors: s.total_errors,
            heartbeat_errors: s.heartbeat_errors,
            fetch_errors: s.fetch_errors,
            last_heartbeat_status: s.last_heartbeat_status,
            last_fetch_status: s.last_fetch_status,
            last_error: s.last_error.clone(),
            last_error_at: s.last_error_at,
            average_loop_duration_ms: u64::try_from(s.average_duration.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

/// Retry and outcome counters for task execution.
#[derive(Default)]
pub struct ExecutionMetrics {
    retries_network: AtomicU64,
    retries_resource: AtomicU64,
    retries_auth: AtomicU64,
    retries_permanent: AtomicU64,
    retries_transient: AtomicU64,
    backoff_events: AtomicU64,
    permanent_failures: AtomicU64,
    exhausted_tasks: AtomicU64,
    admission_limit_reached: AtomicU64,
    quota_exceeded: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    concurrent_tasks: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Point-in-time copy of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    /// Failed attempts classified as network errors.
    pub retries_network: u64,
    /// Failed attempts classified as resource errors.
    pub retries_resource: u64,
    /// Failed attempts classified as auth errors.
    pub retries_auth: u64,
    /// Failed attempts classified as permanent.
    pub retries_permanent: u64,
    /// Failed attempts matching no class.
    pub retries_transient: u64,
    /// Times a task entered a backoff window.
    pub backoff_events: u64,
    /// Tasks abandoned on a permanent error.
    pub permanent_failures: u64,
    /// Tasks abandoned after the retry limit.
    pub exhausted_tasks: u64,
    /// Times a task had to wait for an admission slot.
    pub admission_limit_reached: u64,
    /// Failures reporting an exceeded quota.
    pub quota_exceeded: u64,
    /// Tasks finished, successfully or not.
    pub tasks_completed: u64,
    /// Tasks finished successfully.
    pub tasks_succeeded: u64,
    /// Tasks finished with a failure.
    pub tasks_failed: u64,
    /// Tasks executing right now.
    pub concurrent_tasks: u64,
    /// Mean task duration in milliseconds.
    pub average_duration_ms: u64,
    /// Percentage of completed tasks that succeeded.
    pub success_rate: f64,
}

impl ExecutionMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a failed attempt under the category of its error.
    pub fn record_retry(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Network => &self.retries_network,
            ErrorCategory::Resource => &self.retries_resource,
            ErrorCategory::Auth => &self.retries_auth,
            ErrorCategory::Permanent => &self.retries_permanent,
            ErrorCategory::Transient => &self.retries_transient,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A task entered a backoff window.
    pub fn record_backoff(&self) {
        self.backoff_events.fetch_add(1, Ordering::Relaxed);
    }

    /// A task was abandoned on a permanent error.
    pub fn record_permanent_failure(&self) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A task was abandoned after its last attempt.
    pub fn record_exhausted(&self) {
        self.exhausted_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// A task found no free admission slot.
    pub fn record_admission_limit_reached(&self) {
        self.admission_limit_reached.fetch_add(1, Ordering::Relaxed);
    }

    /// A failure reported an exceeded quota.
    pub fn record_quota_exceeded(&self) {
        self.quota_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    /// An execution attempt started.
    pub fn task_started(&self) {
        self.concurrent_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// An execution attempt finished.
    pub fn task_finished(&self, success: bool, elapsed: Duration) {
        // Saturates at zero.
        let _ = self
            .concurrent_tasks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Copy every counter.
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        let completed = self.tasks_completed.load(Ordering::Relaxed);
        let succeeded = self.tasks_succeeded.load(Ordering::Relaxed);
        let total_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let (average_duration_ms, success_rate) = if completed == 0 {
            (0, 0.0)
        } else {
            (
                total_ms / completed,
                succeeded as f64 / completed as f64 * 100.0,
            )
        };

        ExecutionSnapshot {
            retries_network: self.retries_network.load(Ordering::Relaxed),
            retries_resource: self.retries_resource.load(Ordering::Relaxed),
            retries_auth: self.retries_auth.load(Ordering::Relaxed),
            retries_permanent: self.retries_permanent.load(Ordering::Relaxed),
            retries_transient: self.retries_transient.load(Ordering::Relaxed),
            backoff_events: self.backoff_events.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            exhausted_tasks: self.exhausted_tasks.load(Ordering::Relaxed),
            admission_limit_reached: self.admission_limit_reached.load(Ordering::Relaxed),
            quota_exceeded: self.quota_exceeded.load(Ordering::Relaxed),
            tasks_completed: completed,
            tasks_succeeded: succeeded,
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            concurrent_tasks: self.concurrent_tasks.load(Ordering::Relaxed),
            average_duration_ms,
            success_rate,
        }
    }
}

/// Metrics owned by one scheduler instance.
#[derive(Default)]
pub struct AgentMetrics {
    /// Polling loop metrics.
    pub loop_metrics: LoopMetrics,
    /// Task execution metrics.
    pub execution: ExecutionMetrics,
}

/// Combined snapshot, optionally enriched with admission load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Polling loop figures.
    #[serde(rename = "loop")]
    pub loop_metrics: LoopSnapshot,
    /// Execution figures.
    pub execution: ExecutionSnapshot,
    /// Admission load; absent when no controller is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadSnapshot>,
}

impl AgentMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot both aggregates, adding load figures when `admission` is given.
    pub fn snapshot(&self, admission: Option<&AdmissionController>) -> MetricsSnapshot {
        MetricsSnapshot {
            loop_metrics: self.loop_metrics.snapshot(),
            execution: self.execution.snapshot(),
            load: admission.map(AdmissionController::load_snapshot),
        }
    }
}

impl MetricsSnapshot {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let l = &self.loop_metrics;
        let mut out = format!(
            "loops={} fetched={} heartbeats={} errors={} avg_loop={}ms",
            l.loop_count,
            l.tasks_fetched,
            l.heartbeats_sent,
            l.total_errors,
            l.average_loop_duration_ms
        );
        if let Some(load) = &self.load {
            out.push_str(&format!(
                " running={} available={}",
                load.current_tasks_count, load.available_slots
            ));
        }
        out
    }
}

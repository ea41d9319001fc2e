//! Executes queued tasks under admission control with retry and backoff.
//!
//! Each dequeued task runs on its own spawned future:
//!
//! 1. take an admission slot (non-blocking first, so a full budget is counted);
//! 2. run one attempt, optionally bounded by a timeout;
//! 3. give the slot back before anything else happens;
//! 4. on failure, record it, then give up or sleep out the backoff window and
//!    go back to step 1.
//!
//! Cancelling the dispatcher stops tasks that are waiting for a slot or sitting
//! in backoff. An attempt that is already executing always runs to completion.
//!
//! A panicking executor counts as a failed attempt. The in-flight entry and the
//! running gauge are held by guards, so neither outlives the task's future.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::core::{
    should_retry_at, AdmissionController, AdmissionGuard, AgentMetrics, BackoffPolicy,
    ErrorCategory, ExecutionMetrics, RetryDecision, RetryRecord, SchedulerError, Spawn, Task,
    TaskCategory, TaskExecutor, TaskQueue, TaskResult,
};

/// Retry and timeout settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Delay computation.
    pub backoff: BackoffPolicy,
    /// Attempts allowed per task.
    pub max_attempts: u32,
    /// Per-attempt execution limit.
    pub execution_timeout: Option<Duration>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_attempts: 3,
            execution_timeout: None,
        }
    }
}

/// How a dispatched task ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "camelCase")]
pub enum TaskOutcome {
    /// An attempt succeeded.
    Succeeded(TaskResult),
    /// Abandoned on a permanent error.
    PermanentFailure(String),
    /// Abandoned after the last allowed attempt.
    RetryExhausted(String),
    /// Dispatcher shut down before the task finished.
    Cancelled,
    /// Admission failed for a reason other than capacity.
    Rejected(String),
}

/// Final report for one dispatched task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    /// Task identifier.
    pub task_id: String,
    /// Task category.
    #[serde(rename = "taskType")]
    pub category: TaskCategory,
    /// Attempts executed.
    pub attempts: u32,
    /// Final outcome.
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

struct Shared<E> {
    admission: AdmissionController,
    executor: E,
    metrics: Arc<AgentMetrics>,
    policy: DispatchPolicy,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes a task id from the in-flight set when dropped.
struct InFlightEntry<E> {
    shared: Arc<Shared<E>>,
    task_id: String,
}

impl<E> Drop for InFlightEntry<E> {
    fn drop(&mut self) {
        self.shared.in_flight.lock().remove(&self.task_id);
    }
}

/// One executing attempt as seen by [`ExecutionMetrics`]. Dropping it without
/// [`finish`](Self::finish) records a failure.
struct RunningAttempt<'a> {
    metrics: &'a ExecutionMetrics,
    started: Instant,
    finished: bool,
}

impl<'a> RunningAttempt<'a> {
    fn start(metrics: &'a ExecutionMetrics) -> Self {
        metrics.task_started();
        Self {
            metrics,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self, success: bool) {
        self.finished = true;
        self.metrics.task_finished(success, self.started.elapsed());
    }
}

impl Drop for RunningAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.task_finished(false, self.started.elapsed());
        }
    }
}

/// Pulls tasks from the queue and runs them concurrently.
pub struct Dispatcher<E, S> {
    queue: Arc<dyn TaskQueue>,
    shared: Arc<Shared<E>>,
    reports: Option<mpsc::UnboundedSender<TaskReport>>,
    spawner: S,
    tracker: TaskTracker,
}

impl<E, S> Dispatcher<E, S>
where
    E: TaskExecutor,
    S: Spawn,
{
    /// Create a dispatcher over `queue`, admitting through `admission`.
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        admission: AdmissionController,
        executor: E,
        spawner: S,
        metrics: Arc<AgentMetrics>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            queue,
            shared: Arc::new(Shared {
                admission,
                executor,
                metrics,
                policy,
                in_flight: Mutex::new(HashSet::new()),
            }),
            reports: None,
            spawner,
            tracker: TaskTracker::new(),
        }
    }

    /// Send a [`TaskReport`] for every task dispatched from now on to `tx`.
    #[must_use]
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<TaskReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Tasks currently dispatched (waiting, running or in backoff).
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Dispatch queued tasks until `cancel` fires, then wait for every
    /// dispatched task to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("dispatcher started");
        loop {
            self.dispatch_ready(&cancel);
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.queue.wait_for_task() => {}
            }
        }

        self.tracker.close();
        tracing::info!(in_flight = self.in_flight(), "dispatcher draining");
        self.tracker.wait().await;
        tracing::info!("dispatcher stopped");
    }

    /// Spawn every task currently in the queue. Returns how many were spawned.
    pub fn dispatch_ready(&self, cancel: &CancellationToken) -> usize {
        let mut spawned = 0;
        while let Some(task) = self.queue.dequeue() {
            if !self.shared.in_flight.lock().insert(task.task_id.clone()) {
                tracing::debug!(task_id = %task.task_id, "task already in flight, skipping");
                continue;
            }
            let entry = InFlightEntry {
                shared: Arc::clone(&self.shared),
                task_id: task.task_id.clone(),
            };
            let reports = self.reports.clone();
            let cancel = cancel.child_token();
            self.spawner.spawn(self.tracker.track_future(async move {
                let report = execute_with_retry(&entry.shared, task, &cancel).await;
                drop(entry);
                if let Some(tx) = reports {
                    let _ = tx.send(report);
                }
            }));
            spawned += 1;
        }
        spawned
    }
}

async fn admit<E>(
    shared: &Shared<E>,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<AdmissionGuard, TaskOutcome> {
    match shared.admission.try_acquire(&task.task_id, task.category) {
        Ok(guard) => return Ok(guard),
        Err(SchedulerError::AdmissionExhausted(_)) => {}
        Err(e) => return Err(TaskOutcome::Rejected(e.to_string())),
    }

    shared.metrics.execution.record_admission_limit_reached();
    tracing::debug!(
        task_id = %task.task_id,
        category = %task.category,
        "admission limit reached, waiting for a slot"
    );
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TaskOutcome::Cancelled),
        res = shared.admission.acquire(&task.task_id, task.category) => {
            res.map_err(|e| TaskOutcome::Rejected(e.to_string()))
        }
    }
}

async fn attempt<E: TaskExecutor>(shared: &Shared<E>, task: &Task) -> Result<TaskResult, String> {
    let fut = AssertUnwindSafe(shared.executor.execute(task)).catch_unwind();
    let res = match shared.policy.execution_timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => return Err(format!("execution timeout after {}s", limit.as_secs())),
        },
        None => fut.await,
    };
    match res {
        Ok(res) => res.map_err(|e| format!("{e:#}")),
        Err(payload) => {
            let error = format!("executor panicked: {}", panic_message(payload.as_ref()));
            tracing::error!(task_id = %task.task_id, error = %error, "task executor panicked");
            Err(error)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".into())
}

/// Sleep out a backoff delay on the runtime clock. Returns `false` if
/// cancelled first.
async fn wait_out_backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

async fn execute_with_retry<E: TaskExecutor>(
    shared: &Shared<E>,
    task: Task,
    cancel: &CancellationToken,
) -> TaskReport {
    let policy = &shared.policy;
    let exec = &shared.metrics.execution;
    let mut record = RetryRecord::reset_on_success(policy.max_attempts);
    let mut attempts = 0;
    let mut failures: Vec<String> = Vec::new();

    let outcome = loop {
        let guard = match admit(shared, &task, cancel).await {
            Ok(guard) => guard,
            Err(outcome) => break outcome,
        };

        attempts += 1;
        tracing::info!(
            task_id = %task.task_id,
            category = %task.category,
            attempt = attempts,
            "executing task"
        );
        let running = RunningAttempt::start(exec);
        let result = attempt(shared, &task).await;
        drop(guard);
        running.finish(result.is_ok());

        let error = match result {
            Ok(mut res) => {
                if attempts > 1 {
                    let meta = res.metadata.get_or_insert_with(Default::default);
                    meta.insert("retryAttempts".into(), Value::from(attempts));
                    meta.insert("retriedErrors".into(), Value::from(failures.clone()));
                }
                tracing::info!(
                    task_id = %task.task_id,
                    attempts,
                    duration_ms = u64::try_from(res.duration().as_millis()).unwrap_or(u64::MAX),
                    "task completed"
                );
                break TaskOutcome::Succeeded(res);
            }
            Err(error) => error,
        };

        failures.push(format!("attempt {attempts}: {error}"));
        let category = ErrorCategory::classify(&error);
        exec.record_retry(category);
        if error.to_lowercase().contains("quota exceeded") {
            exec.record_quota_exceeded();
        }

        let (failed, delay) = policy.backoff.record_failure_with_delay(&record, &error);
        record = failed;
        match should_retry_at(&record, Utc::now()) {
            RetryDecision::MaxRetriesReached => {
                exec.record_exhausted();
                tracing::error!(
                    task_id = %task.task_id,
                    attempts,
                    error = %error,
                    "task exhausted retries"
                );
                break TaskOutcome::RetryExhausted(error);
            }
            RetryDecision::PermanentError => {
                exec.record_permanent_failure();
                tracing::error!(
                    task_id = %task.task_id,
                    error_category = ?category,
                    error = %error,
                    "permanent failure, not retrying"
                );
                break TaskOutcome::PermanentFailure(error);
            }
            RetryDecision::BackoffActive | RetryDecision::Retry => {
                exec.record_backoff();
                if !wait_out_backoff(delay, cancel).await {
                    break TaskOutcome::Cancelled;
                }
            }
        }
    };

    if matches!(outcome, TaskOutcome::Cancelled) {
        tracing::info!(task_id = %task.task_id, attempts, "task cancelled");
    }
    TaskReport {
        task_id: task.task_id,
        category: task.category,
        attempts,
        outcome,
    }
}

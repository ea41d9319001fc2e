//! Periodic polling loop: heartbeat, fetch, enqueue.
//!
//! The loop moves `Idle → Running → Stopping → Stopped`. [`PollingLoop::start`]
//! runs one iteration immediately and then one per interval tick. Cancellation
//! (the caller's token) and [`PollingLoop::stop`] are observed between
//! iterations and while waiting for the next tick, never in the middle of an
//! iteration. Heartbeat and fetch failures are recorded and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::{
    AdmissionController, AgentMetrics, HeartbeatSender, MetricsSnapshot, SchedulerError,
    TaskQueue, TaskSource,
};
use crate::runtime::HeartbeatPayload;

/// Lifecycle state of a [`PollingLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, not started.
    Idle,
    /// Iterating.
    Running,
    /// `stop` requested; finishing the current iteration.
    Stopping,
    /// Exited.
    Stopped,
}

/// Drives heartbeats and task fetching on a fixed interval.
pub struct PollingLoop {
    interval: Duration,
    agent_version: String,
    started_at: std::time::Instant,
    heartbeat: Arc<dyn HeartbeatSender>,
    source: Arc<dyn TaskSource>,
    queue: Arc<dyn TaskQueue>,
    admission: Option<AdmissionController>,
    metrics: Arc<AgentMetrics>,
    state: Mutex<SchedulerState>,
    stop: CancellationToken,
    finished: CancellationToken,
}

/// Marks the loop stopped and signals completion even if `start` is dropped.
struct FinishGuard<'a>(&'a PollingLoop);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        *self.0.state.lock() = SchedulerState::Stopped;
        self.0.finished.cancel();
    }
}

impl PollingLoop {
    /// Create a loop that feeds `queue` from `source` every `interval`.
    pub fn new(
        interval: Duration,
        heartbeat: Arc<dyn HeartbeatSender>,
        source: Arc<dyn TaskSource>,
        queue: Arc<dyn TaskQueue>,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            interval,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: std::time::Instant::now(),
            heartbeat,
            source,
            queue,
            admission: None,
            metrics,
            state: Mutex::new(SchedulerState::Idle),
            stop: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// Enrich heartbeats and snapshots with this controller's load.
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Version string reported in heartbeats.
    #[must_use]
    pub fn with_agent_version(mut self, version: impl Into<String>) -> Self {
        self.agent_version = version.into();
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Shared metrics.
    pub const fn metrics(&self) -> &Arc<AgentMetrics> {
        &self.metrics
    }

    /// Metrics snapshot including admission load when attached.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.admission.as_ref())
    }

    /// Run the loop until `cancel` fires or [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// `Cancelled` when `cancel` ended the loop, `AlreadyStarted` if the loop
    /// is not idle.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Idle {
                return Err(SchedulerError::AlreadyStarted);
            }
            *state = SchedulerState::Running;
        }
        let _finish = FinishGuard(self);

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            version = %self.agent_version,
            "polling loop started"
        );
        let result = self.run(&cancel).await;
        match &result {
            Ok(()) => tracing::info!("polling loop stopped"),
            Err(e) => tracing::info!(reason = %e, "polling loop exited"),
        }
        result
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<(), SchedulerError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            if cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            if self.stop.is_cancelled() {
                return Ok(());
            }

            self.run_iteration().await;

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                () = self.stop.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
        }
    }

    /// Request shutdown and wait until the loop has exited.
    ///
    /// Returns immediately if the loop never started; a loop stopped while
    /// idle can no longer be started.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Idle => {
                    *state = SchedulerState::Stopped;
                    return;
                }
                SchedulerState::Running => *state = SchedulerState::Stopping,
                SchedulerState::Stopping | SchedulerState::Stopped => {}
            }
        }
        self.stop.cancel();
        self.finished.cancelled().await;
    }

    /// Run a single iteration: heartbeat, fetch, enqueue.
    pub async fn run_iteration(&self) {
        let iteration = self.metrics.loop_metrics.record_iteration_start();
        let started = Instant::now();
        tracing::debug!(iteration, "polling iteration started");

        let payload = self.build_heartbeat();
        match self.heartbeat.send_heartbeat(payload).await {
            Ok(()) => self.metrics.loop_metrics.record_heartbeat_success(),
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::warn!(error = %msg, "heartbeat failed");
                self.metrics.loop_metrics.record_heartbeat_error(&msg);
            }
        }

        match self.source.fetch_tasks().await {
            Ok(tasks) => {
                self.metrics.loop_metrics.record_tasks_fetched(tasks.len());
                if tasks.is_empty() {
                    tracing::debug!("no pending tasks");
                } else {
                    let fetched = tasks.len();
                    let (added, err) = self.queue.enqueue_multiple(tasks);
                    if let Some(e) = err {
                        tracing::warn!(fetched, added, error = %e, "some tasks were not enqueued");
                    }
                    tracing::info!(added, queued = self.queue.size(), "tasks enqueued");
                }
            }
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::warn!(error = %msg, "task fetch failed");
                self.metrics.loop_metrics.record_fetch_error(&msg);
            }
        }

        let elapsed = started.elapsed();
        self.metrics.loop_metrics.record_iteration_duration(elapsed);
        tracing::debug!(
            iteration,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "polling iteration finished"
        );
    }

    fn build_heartbeat(&self) -> HeartbeatPayload {
        let payload = HeartbeatPayload::new(&self.agent_version, self.started_at.elapsed());
        match &self.admission {
            Some(admission) => payload.with_load(&admission.load_snapshot()),
            None => payload,
        }
    }

    /// One-line metrics summary.
    pub fn format_metrics(&self) -> String {
        self.snapshot().summary()
    }

    /// Emit the current status as a structured log event.
    pub fn log_status(&self) {
        let snap = self.snapshot();
        let l = &snap.loop_metrics;
        tracing::info!(
            state = ?self.state(),
            loop_count = l.loop_count,
            tasks_fetched = l.tasks_fetched,
            heartbeats_sent = l.heartbeats_sent,
            heartbeat_status = %l.last_heartbeat_status,
            fetch_status = %l.last_fetch_status,
            heartbeat_errors = l.heartbeat_errors,
            fetch_errors = l.fetch_errors,
            avg_loop_ms = l.average_loop_duration_ms,
            last_error = l.last_error.as_deref().unwrap_or(""),
            queued = self.queue.size(),
            "polling loop status"
        );
        if let Some(load) = &snap.load {
            tracing::info!(
                running = load.current_tasks_count,
                available = load.available_slots,
                "admission load"
            );
        }
    }
}

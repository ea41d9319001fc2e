//! Builders to construct an agent's scheduling components from configuration.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::core::{
    AdmissionController, AgentMetrics, DispatchPolicy, Dispatcher, HeartbeatSender,
    PollingLoop, SchedulerError, Spawn, TaskExecutor, TaskReport, TaskSource,
};
use crate::infra::InMemoryQueue;

/// Fully wired scheduling core: queue, admission, metrics, loop and dispatcher.
pub struct Agent<E, S> {
    /// Pending tasks.
    pub queue: Arc<InMemoryQueue>,
    /// Concurrency budget.
    pub admission: AdmissionController,
    /// Metrics shared by the loop and the dispatcher.
    pub metrics: Arc<AgentMetrics>,
    /// Heartbeat and fetch loop.
    pub polling: Arc<PollingLoop>,
    /// Executes queued tasks.
    pub dispatcher: Arc<Dispatcher<E, S>>,
}

impl<E, S> Agent<E, S>
where
    E: TaskExecutor,
    S: Spawn,
{
    /// Run the polling loop and the dispatcher until `cancel` fires or the
    /// loop is stopped, then drain in-flight tasks.
    ///
    /// # Errors
    ///
    /// Whatever [`PollingLoop::start`] returns.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        let dispatch_cancel = cancel.child_token();
        let polling = async {
            let res = self.polling.start(cancel.clone()).await;
            // The loop may also end through `stop()`; take the dispatcher down with it.
            dispatch_cancel.cancel();
            res
        };
        let (res, ()) = tokio::join!(polling, self.dispatcher.run(dispatch_cancel.clone()));
        res
    }
}

/// Validate `cfg` and wire an [`Agent`] around the given collaborators.
///
/// # Errors
///
/// `SchedulerError::InvalidConfig` when validation fails.
pub fn build_agent<E, S>(
    cfg: &AgentConfig,
    heartbeat: Arc<dyn HeartbeatSender>,
    source: Arc<dyn TaskSource>,
    executor: E,
    spawner: S,
    reports: Option<mpsc::UnboundedSender<TaskReport>>,
) -> Result<Agent<E, S>, SchedulerError>
where
    E: TaskExecutor,
    S: Spawn,
{
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let queue = Arc::new(InMemoryQueue::new());
    let admission = AdmissionController::new(
        cfg.concurrency.max_concurrent_tasks as usize,
        cfg.concurrency.category_capacities(),
    );
    let metrics = Arc::new(AgentMetrics::new());

    let polling = PollingLoop::new(
        cfg.polling_interval(),
        heartbeat,
        source,
        queue.clone(),
        Arc::clone(&metrics),
    )
    .with_admission(admission.clone())
    .with_agent_version(cfg.agent_version.clone());

    let policy = DispatchPolicy {
        backoff: cfg.retry.backoff_policy(),
        max_attempts: cfg.retry.max_attempts,
        execution_timeout: cfg.execution_timeout(),
    };
    let mut dispatcher = Dispatcher::new(
        queue.clone(),
        admission.clone(),
        executor,
        spawner,
        Arc::clone(&metrics),
        policy,
    );
    if let Some(tx) = reports {
        dispatcher = dispatcher.with_reports(tx);
    }

    tracing::info!(
        polling_interval_secs = cfg.polling_interval_secs,
        max_concurrent_tasks = cfg.concurrency.max_concurrent_tasks,
        max_attempts = cfg.retry.max_attempts,
        "agent built"
    );

    Ok(Agent {
        queue,
        admission,
        metrics,
        polling: Arc::new(polling),
        dispatcher: Arc::new(dispatcher),
    })
}

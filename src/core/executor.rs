//! Collaborator traits at the scheduler boundary.
//!
//! The core never talks to the network or spawns processes itself. Heartbeat
//! delivery, task fetching and task execution are supplied by the embedding
//! application through these traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{AppResult, Task, TaskCategory};
use crate::runtime::HeartbeatPayload;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Successful execution of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Identifier of the executed task.
    pub task_id: String,
    /// Category of the executed task.
    #[serde(rename = "taskType")]
    pub category: TaskCategory,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub completed_at: DateTime<Utc>,
    /// Captured output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Executor-specific details (snapshot id, bytes processed, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl TaskResult {
    /// Result for `task` spanning `started_at` until now.
    pub fn completed(task: &Task, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.task_id.clone(),
            category: task.category,
            started_at,
            completed_at: Utc::now(),
            log: None,
            metadata: None,
        }
    }

    /// Wall-clock execution time.
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Runs a task to completion.
///
/// An `Err` is a failed attempt; its text drives retry classification, so
/// implementations should surface the underlying tool's message verbatim.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use fleet_agent::core::{AppResult, Task, TaskExecutor, TaskResult};
///
/// struct ResticExecutor;
///
/// #[async_trait]
/// impl TaskExecutor for ResticExecutor {
///     async fn execute(&self, task: &Task) -> AppResult<TaskResult> {
///         let started = chrono::Utc::now();
///         run_restic(task).await?;
///         Ok(TaskResult::completed(task, started))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Execute one attempt of `task`.
    async fn execute(&self, task: &Task) -> AppResult<TaskResult>;
}

/// Delivers liveness reports to the orchestrator.
#[async_trait]
pub trait HeartbeatSender: Send + Sync + 'static {
    /// Send one heartbeat.
    async fn send_heartbeat(&self, payload: HeartbeatPayload) -> AppResult<()>;
}

/// Fetches pending tasks from the orchestrator.
///
/// Implementations validate what they return (see [`Task::validate`]); the
/// scheduler trusts its input.
#[async_trait]
pub trait TaskSource: Send + Sync + 'static {
    /// Fetch the currently pending tasks.
    async fn fetch_tasks(&self) -> AppResult<Vec<Task>>;
}

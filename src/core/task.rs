//! Task model shared by the queue, admission controller and executors.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Category of work; selects the per-category admission budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    /// Snapshot creation.
    Backup,
    /// Repository integrity check.
    Check,
    /// Retention enforcement (`forget --prune`).
    Prune,
}

impl TaskCategory {
    /// Every category, in reporting order.
    pub const ALL: [Self; 3] = [Self::Backup, Self::Check, Self::Prune];

    /// Wire name of the category.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Check => "check",
            Self::Prune => "prune",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup" => Ok(Self::Backup),
            "check" => Ok(Self::Check),
            "prune" => Ok(Self::Prune),
            other => Err(format!(
                "taskType must be one of: backup, check, prune (got: {other})"
            )),
        }
    }
}

/// A unit of work fetched from the orchestrator.
///
/// Immutable once fetched; identity is [`Task::task_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier (UUID formatted in practice).
    pub task_id: String,
    /// Owning policy identifier.
    pub policy_id: String,
    /// Task category.
    #[serde(rename = "taskType")]
    pub category: TaskCategory,
    /// Target repository address.
    pub repository: String,
    /// Paths to include (backup only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_paths: Option<Map<String, Value>>,
    /// Patterns to exclude (backup only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_paths: Option<Map<String, Value>>,
    /// Retention rules (prune only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Map<String, Value>>,
    /// Execution tuning passed through to the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_params: Option<Map<String, Value>>,
    /// Creation timestamp assigned by the orchestrator.
    pub created_at: DateTime<Utc>,
    /// Optional time the task was scheduled for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with empty parameter maps.
    pub fn new(
        task_id: impl Into<String>,
        policy_id: impl Into<String>,
        category: TaskCategory,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            policy_id: policy_id.into(),
            category,
            repository: repository.into(),
            include_paths: None,
            exclude_paths: None,
            retention: None,
            execution_params: None,
            created_at: Utc::now(),
            scheduled_for: None,
        }
    }

    /// Validate the fields a fetch collaborator must check before handing
    /// tasks to the scheduler. The scheduler itself trusts its input.
    pub fn validate(&self) -> Result<(), String> {
        Uuid::parse_str(&self.task_id)
            .map_err(|e| format!("taskId must be a valid UUID: {e}"))?;
        Uuid::parse_str(&self.policy_id)
            .map_err(|e| format!("policyId must be a valid UUID: {e}"))?;
        if self.repository.is_empty() {
            return Err("repository cannot be empty".into());
        }
        if self.created_at.timestamp() == 0 {
            return Err("createdAt must be set".into());
        }
        Ok(())
    }
}

/// Body of a task-fetch response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksResponse {
    /// Pending tasks.
    pub tasks: Vec<Task>,
    /// Number of tasks reported by the orchestrator.
    pub count: usize,
}

impl TasksResponse {
    /// Parse a fetch response and validate every task in it.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let resp: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        for (i, task) in resp.tasks.iter().enumerate() {
            task.validate()
                .map_err(|e| format!("invalid task at index {i}: {e}"))?;
        }
        Ok(resp)
    }
}

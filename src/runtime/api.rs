//! Orchestrator-facing request/response models.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{LoadSnapshot, TaskCategory};

/// Number of running tasks of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypeCount {
    /// Category.
    pub task_type: TaskCategory,
    /// Running tasks.
    pub count: usize,
}

/// Free and maximum slots of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypeCapacity {
    /// Category.
    pub task_type: TaskCategory,
    /// Free slots.
    pub available: usize,
    /// Configured maximum.
    pub maximum: usize,
}

/// Heartbeat body sent on every loop iteration.
///
/// Load fields are present only when an admission controller is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    /// Agent version.
    pub version: String,
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Seconds since the agent started.
    pub uptime_seconds: u64,
    /// When the heartbeat was built.
    pub heartbeat_at: DateTime<Utc>,
    /// Tasks currently executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tasks_count: Option<usize>,
    /// Running tasks per category; categories with none running are omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_task_types: Option<Vec<TaskTypeCount>>,
    /// Free slots in the total budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_slots: Option<usize>,
    /// Free and maximum slots per category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_slots_by_type: Option<Vec<TaskTypeCapacity>>,
}

impl HeartbeatPayload {
    /// Build a bare heartbeat for the current host.
    pub fn new(version: impl Into<String>, uptime: Duration) -> Self {
        Self {
            version: version.into(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            uptime_seconds: uptime.as_secs(),
            heartbeat_at: Utc::now(),
            current_tasks_count: None,
            running_task_types: None,
            available_slots: None,
            available_slots_by_type: None,
        }
    }

    /// Attach admission load figures.
    #[must_use]
    pub fn with_load(mut self, load: &LoadSnapshot) -> Self {
        self.current_tasks_count = Some(load.current_tasks_count);
        self.running_task_types = Some(
            load.running_by_category
                .iter()
                .filter(|(_, &count)| count > 0)
                .map(|(&task_type, &count)| TaskTypeCount { task_type, count })
                .collect(),
        );
        self.available_slots = Some(load.available_slots);
        self.available_slots_by_type = Some(
            load.available_slots_by_category
                .iter()
                .map(|(&task_type, &available)| TaskTypeCapacity {
                    task_type,
                    available,
                    maximum: load.capacity_by_category.get(&task_type).copied().unwrap_or(0),
                })
                .collect(),
        );
        self
    }
}

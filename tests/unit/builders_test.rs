//! Tests for building an agent from configuration

use async_trait::async_trait;
use fleet_agent::builders::build_agent;
use fleet_agent::config::AgentConfig;
use fleet_agent::core::{
    AppResult, HeartbeatSender, SchedulerError, SchedulerState, Task, TaskCategory, TaskExecutor,
    TaskQueue, TaskResult, TaskSource,
};
use fleet_agent::runtime::{HeartbeatPayload, TokioSpawner};
use std::sync::Arc;

struct NoopHeartbeat;

#[async_trait]
impl HeartbeatSender for NoopHeartbeat {
    async fn send_heartbeat(&self, _payload: HeartbeatPayload) -> AppResult<()> {
        Ok(())
    }
}

struct EmptySource;

#[async_trait]
impl TaskSource for EmptySource {
    async fn fetch_tasks(&self) -> AppResult<Vec<Task>> {
        Ok(Vec::new())
    }
}

struct OkExecutor;

#[async_trait]
impl TaskExecutor for OkExecutor {
    async fn execute(&self, task: &Task) -> AppResult<TaskResult> {
        Ok(TaskResult::completed(task, chrono::Utc::now()))
    }
}

#[tokio::test]
async fn test_build_agent_wires_capacities() {
    let cfg = AgentConfig::default();
    let agent = build_agent(
        &cfg,
        Arc::new(NoopHeartbeat),
        Arc::new(EmptySource),
        OkExecutor,
        TokioSpawner::current(),
        None,
    )
    .unwrap();

    assert_eq!(agent.admission.total_capacity(), 3);
    assert_eq!(agent.admission.capacity_for(TaskCategory::Backup), 1);
    assert_eq!(agent.polling.state(), SchedulerState::Idle);
    assert!(agent.queue.is_empty());
}

#[tokio::test]
async fn test_build_agent_rejects_invalid_config() {
    let mut cfg = AgentConfig::default();
    cfg.concurrency.max_concurrent_tasks = 0;
    let result = build_agent(
        &cfg,
        Arc::new(NoopHeartbeat),
        Arc::new(EmptySource),
        OkExecutor,
        TokioSpawner::current(),
        None,
    );
    assert!(matches!(
        result,
        Err(SchedulerError::InvalidConfig(msg)) if msg.contains("must be positive")
    ));
}

//! Core scheduling abstractions: tasks, backoff, admission, queueing, metrics
//! and the polling loop.

pub mod admission;
pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod task;

pub use admission::{AdmissionController, AdmissionGuard, LoadSnapshot};
pub use backoff::{
    compute_delay, is_permanent_error, next_retry_at, record_failure, reset_on_success,
    should_retry, should_retry_at, BackoffPolicy, ErrorCategory, RetryDecision, RetryRecord,
    PERMANENT_ERRORS,
};
pub use dispatcher::{DispatchPolicy, Dispatcher, TaskOutcome, TaskReport};
pub use error::{AppResult, SchedulerError};
pub use executor::{HeartbeatSender, Spawn, TaskExecutor, TaskResult, TaskSource};
pub use metrics::{
    AgentMetrics, ExecutionMetrics, ExecutionSnapshot, LastStatus, LoopMetrics, LoopSnapshot,
    MetricsSnapshot,
};
pub use queue::TaskQueue;
pub use scheduler::{PollingLoop, SchedulerState};
pub use task::{Task, TaskCategory, TasksResponse};

//! Queue abstraction for fetched tasks awaiting execution.

use async_trait::async_trait;

use crate::core::{SchedulerError, Task};

/// Abstraction for pending-task queue backends.
///
/// Implementations hold tasks in FIFO order, reject repeat identifiers and are
/// safe to share between the polling loop and any number of consumers. Only
/// [`wait_for_task`](Self::wait_for_task) waits.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task unless one with the same identifier is already queued.
    ///
    /// # Errors
    ///
    /// `SchedulerError::DuplicateTask` when the identifier is present.
    fn enqueue(&self, task: Task) -> Result<(), SchedulerError>;

    /// Enqueue each task independently, skipping duplicates.
    ///
    /// Returns the number added and, if anything was skipped, a
    /// `DuplicatesSkipped` error naming the skipped tasks. A returned error
    /// does not mean nothing was added.
    fn enqueue_multiple(&self, tasks: Vec<Task>) -> (usize, Option<SchedulerError>) {
        let mut added = 0;
        let mut skipped = Vec::new();
        for task in tasks {
            match self.enqueue(task) {
                Ok(()) => added += 1,
                Err(e) => skipped.push(e.to_string()),
            }
        }
        let err = (!skipped.is_empty()).then_some(SchedulerError::DuplicatesSkipped(skipped));
        (added, err)
    }

    /// Remove and return the head.
    fn dequeue(&self) -> Option<Task>;

    /// Return a copy of the head without removing it.
    fn peek(&self) -> Option<Task>;

    /// Current depth.
    fn size(&self) -> usize;

    /// Whether the queue holds no tasks.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether a task with `task_id` is queued.
    fn contains(&self, task_id: &str) -> bool;

    /// Remove a task by identifier wherever it sits; returns whether it was found.
    fn remove(&self, task_id: &str) -> bool;

    /// Independent copy of the queued tasks in FIFO order.
    fn get_all(&self) -> Vec<Task>;

    /// Drop every queued task.
    fn clear(&self);

    /// Wait until the queue is non-empty.
    ///
    /// Wakeups may be spurious; callers re-check with [`dequeue`](Self::dequeue).
    async fn wait_for_task(&self);
}

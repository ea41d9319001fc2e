//! In-memory FIFO queue with identifier deduplication.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{SchedulerError, Task, TaskQueue};

struct QueueState {
    /// Tasks in insertion order.
    tasks: VecDeque<Task>,
    /// Identifiers currently in `tasks`.
    ids: HashSet<String>,
}

/// In-memory queue storing fetched tasks.
///
/// The ordered sequence and the membership set share one `parking_lot::Mutex`,
/// so the duplicate check and the insert happen under a single acquisition.
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                ids: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    fn enqueue(&self, task: Task) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.ids.contains(&task.task_id) {
            return Err(SchedulerError::DuplicateTask(task.task_id));
        }
        state.ids.insert(task.task_id.clone());
        state.tasks.push_back(task);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    fn dequeue(&self) -> Option<Task> {
        let mut state = self.state.lock();
        let task = state.tasks.pop_front()?;
        state.ids.remove(&task.task_id);
        Some(task)
    }

    fn peek(&self) -> Option<Task> {
        self.state.lock().tasks.front().cloned()
    }

    fn size(&self) -> usize {
        self.state.lock().tasks.len()
    }

    fn contains(&self, task_id: &str) -> bool {
        self.state.lock().ids.contains(task_id)
    }

    fn remove(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        if !state.ids.remove(task_id) {
            return false;
        }
        state.tasks.retain(|t| t.task_id != task_id);
        true
    }

    fn get_all(&self) -> Vec<Task> {
        self.state.lock().tasks.iter().cloned().collect()
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.tasks.clear();
        state.ids.clear();
    }

    async fn wait_for_task(&self) {
        let notified = self.notify.notified();
        let has_tasks = !self.state.lock().tasks.is_empty();
        if has_tasks {
            return;
        }
        notified.await;
    }
}

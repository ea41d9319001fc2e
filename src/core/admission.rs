//! Hierarchical admission control.
//!
//! Every task needs two slots before it may run: one from its category's
//! semaphore and one from the shared total semaphore. Slots are always taken
//! in that order (category, then total) and a task only ever holds one
//! category slot, so a blocked task never pins a total slot while waiting on
//! its category.
//!
//! The set of running tasks lives behind a single `parking_lot::Mutex`. The
//! held permits are stored in that set, so removing an entry is what returns
//! the slots; every read used for reporting goes through the same lock.
//!
//! A per-category capacity of `0` means "no dedicated cap": the category is
//! bounded by the total capacity only.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::core::{SchedulerError, TaskCategory};

/// A slot held by a running task.
struct RunningEntry {
    category: TaskCategory,
    admitted_at: Instant,
    _category_permit: Option<OwnedSemaphorePermit>,
    _total_permit: OwnedSemaphorePermit,
}

struct CategoryLimit {
    capacity: usize,
    semaphore: Option<Arc<Semaphore>>,
}

struct Inner {
    total_capacity: usize,
    total: Arc<Semaphore>,
    categories: HashMap<TaskCategory, CategoryLimit>,
    running: Mutex<HashMap<String, RunningEntry>>,
}

/// Point-in-time view of admission load, taken under one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Tasks currently admitted.
    pub current_tasks_count: usize,
    /// Admitted tasks per category.
    pub running_by_category: BTreeMap<TaskCategory, usize>,
    /// Free slots in the total budget.
    pub available_slots: usize,
    /// Free slots per category, bounded by the free total.
    pub available_slots_by_category: BTreeMap<TaskCategory, usize>,
    /// Effective maximum per category.
    pub capacity_by_category: BTreeMap<TaskCategory, usize>,
}

/// Bounds concurrent execution globally and per task category.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Create a controller with a total capacity and per-category capacities.
    ///
    /// Categories missing from `per_category`, or given `0`, are capped only by
    /// the total.
    pub fn new(
        total_capacity: usize,
        per_category: impl IntoIterator<Item = (TaskCategory, usize)>,
    ) -> Self {
        let mut categories: HashMap<TaskCategory, CategoryLimit> = TaskCategory::ALL
            .into_iter()
            .map(|c| {
                (
                    c,
                    CategoryLimit {
                        capacity: total_capacity,
                        semaphore: None,
                    },
                )
            })
            .collect();

        for (category, capacity) in per_category {
            if capacity > 0 {
                categories.insert(
                    category,
                    CategoryLimit {
                        capacity,
                        semaphore: Some(Arc::new(Semaphore::new(capacity))),
                    },
                );
            }
        }

        Self {
            inner: Arc::new(Inner {
                total_capacity,
                total: Arc::new(Semaphore::new(total_capacity)),
                categories,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Wait until both the category and the total budget have a free slot,
    /// then register the task as running.
    ///
    /// The returned guard releases the slots when dropped, so a task that
    /// errors, panics, times out or is cancelled never leaks its slot.
    ///
    /// # Errors
    ///
    /// `DuplicateTask` if the identifier is already admitted, `ControllerClosed`
    /// if [`close`](Self::close) was called while waiting.
    pub async fn acquire(
        &self,
        task_id: &str,
        category: TaskCategory,
    ) -> Result<AdmissionGuard, SchedulerError> {
        if self.inner.running.lock().contains_key(task_id) {
            return Err(SchedulerError::DuplicateTask(task_id.to_string()));
        }

        let category_permit = match self.category_semaphore(category) {
            Some(sem) => Some(
                sem.acquire_owned()
                    .await
                    .map_err(|_| SchedulerError::ControllerClosed)?,
            ),
            None => None,
        };
        let total_permit = Arc::clone(&self.inner.total)
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::ControllerClosed)?;

        self.register(task_id, category, category_permit, total_permit)
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    ///
    /// # Errors
    ///
    /// `AdmissionExhausted` when either budget is full; otherwise as `acquire`.
    pub fn try_acquire(
        &self,
        task_id: &str,
        category: TaskCategory,
    ) -> Result<AdmissionGuard, SchedulerError> {
        let map_err = |e: TryAcquireError| match e {
            TryAcquireError::NoPermits => SchedulerError::AdmissionExhausted(task_id.to_string()),
            TryAcquireError::Closed => SchedulerError::ControllerClosed,
        };

        if self.inner.running.lock().contains_key(task_id) {
            return Err(SchedulerError::DuplicateTask(task_id.to_string()));
        }

        let category_permit = match self.category_semaphore(category) {
            Some(sem) => Some(sem.try_acquire_owned().map_err(map_err)?),
            None => None,
        };
        let total_permit = Arc::clone(&self.inner.total)
            .try_acquire_owned()
            .map_err(map_err)?;

        self.register(task_id, category, category_permit, total_permit)
    }

    fn category_semaphore(&self, category: TaskCategory) -> Option<Arc<Semaphore>> {
        self.inner
            .categories
            .get(&category)
            .and_then(|limit| limit.semaphore.clone())
    }

    fn register(
        &self,
        task_id: &str,
        category: TaskCategory,
        category_permit: Option<OwnedSemaphorePermit>,
        total_permit: OwnedSemaphorePermit,
    ) -> Result<AdmissionGuard, SchedulerError> {
        let mut running = self.inner.running.lock();
        if running.contains_key(task_id) {
            // Permits drop here and go straight back to the semaphores.
            return Err(SchedulerError::DuplicateTask(task_id.to_string()));
        }
        running.insert(
            task_id.to_string(),
            RunningEntry {
                category,
                admitted_at: Instant::now(),
                _category_permit: category_permit,
                _total_permit: total_permit,
            },
        );
        let count = running.len();
        drop(running);

        tracing::debug!(task_id, %category, running = count, "task admitted");
        Ok(AdmissionGuard {
            controller: self.clone(),
            task_id: task_id.to_string(),
            category,
            released: false,
        })
    }

    /// Return both slots held by `task_id` and forget it.
    ///
    /// Returns `false` if the task was not admitted (or already released).
    pub fn release(&self, task_id: &str) -> bool {
        let entry = self.inner.running.lock().remove(task_id);
        match entry {
            Some(entry) => {
                tracing::debug!(
                    task_id,
                    category = %entry.category,
                    held_ms = entry.admitted_at.elapsed().as_millis() as u64,
                    "task released"
                );
                true
            }
            None => false,
        }
    }

    /// Close both semaphore levels; pending `acquire` calls fail with
    /// `ControllerClosed`. Running tasks keep their slots until released.
    pub fn close(&self) {
        self.inner.total.close();
        for limit in self.inner.categories.values() {
            if let Some(sem) = &limit.semaphore {
                sem.close();
            }
        }
    }

    /// Configured total capacity.
    pub fn total_capacity(&self) -> usize {
        self.inner.total_capacity
    }

    /// Effective maximum concurrency for a category.
    pub fn capacity_for(&self, category: TaskCategory) -> usize {
        self.inner
            .categories
            .get(&category)
            .map_or(self.inner.total_capacity, |limit| limit.capacity)
    }

    /// Number of admitted tasks.
    pub fn running_count(&self) -> usize {
        self.inner.running.lock().len()
    }

    /// Number of admitted tasks in `category`.
    pub fn running_count_by_category(&self, category: TaskCategory) -> usize {
        self.inner
            .running
            .lock()
            .values()
            .filter(|e| e.category == category)
            .count()
    }

    /// Whether `task_id` currently holds a slot.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.inner.running.lock().contains_key(task_id)
    }

    /// Free slots in the total budget.
    pub fn available_slots(&self) -> usize {
        let running = self.inner.running.lock().len();
        self.inner.total_capacity.saturating_sub(running)
    }

    /// Free slots for `category`, bounded by the free total.
    pub fn available_slots_by_category(&self, category: TaskCategory) -> usize {
        let running = self.inner.running.lock();
        let in_category = running.values().filter(|e| e.category == category).count();
        let total_free = self.inner.total_capacity.saturating_sub(running.len());
        self.capacity_for(category)
            .saturating_sub(in_category)
            .min(total_free)
    }

    /// Consistent snapshot of every load figure.
    pub fn load_snapshot(&self) -> LoadSnapshot {
        let running = self.inner.running.lock();
        let total_free = self.inner.total_capacity.saturating_sub(running.len());

        let mut running_by_category = BTreeMap::new();
        let mut available_slots_by_category = BTreeMap::new();
        let mut capacity_by_category = BTreeMap::new();
        for category in TaskCategory::ALL {
            let in_category = running.values().filter(|e| e.category == category).count();
            let capacity = self.capacity_for(category);
            running_by_category.insert(category, in_category);
            available_slots_by_category
                .insert(category, capacity.saturating_sub(in_category).min(total_free));
            capacity_by_category.insert(category, capacity);
        }

        LoadSnapshot {
            current_tasks_count: running.len(),
            running_by_category,
            available_slots: total_free,
            available_slots_by_category,
            capacity_by_category,
        }
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("total_capacity", &self.inner.total_capacity)
            .field("running", &self.running_count())
            .finish_non_exhaustive()
    }
}

/// RAII admission slot. Dropping it releases the slot.
#[must_use = "dropping the guard releases the admission slot immediately"]
#[derive(Debug)]
pub struct AdmissionGuard {
    controller: AdmissionController,
    task_id: String,
    category: TaskCategory,
    released: bool,
}

impl AdmissionGuard {
    /// Identifier of the admitted task.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Category the slot was taken from.
    pub const fn category(&self) -> TaskCategory {
        self.category
    }

    /// Release explicitly; equivalent to dropping the guard.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.controller.release(&self.task_id);
        }
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

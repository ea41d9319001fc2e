//! Tests for the in-memory task queue

use fleet_agent::core::{SchedulerError, Task, TaskCategory, TaskQueue};
use fleet_agent::infra::InMemoryQueue;
use std::sync::Arc;

fn make_task(id: &str, category: TaskCategory) -> Task {
    Task::new(id, "policy-1", category, "s3:bucket/repo")
}

#[test]
fn test_enqueue_duplicate_leaves_size_unchanged() {
    let q = InMemoryQueue::new();
    q.enqueue(make_task("a", TaskCategory::Backup)).unwrap();
    assert!(matches!(
        q.enqueue(make_task("a", TaskCategory::Check)),
        Err(SchedulerError::DuplicateTask(_))
    ));
    assert_eq!(q.size(), 1);
}

#[test]
fn test_enqueue_multiple_with_one_duplicate() {
    let q = InMemoryQueue::new();
    q.enqueue(make_task("b", TaskCategory::Backup)).unwrap();

    let (added, err) = q.enqueue_multiple(vec![
        make_task("a", TaskCategory::Backup),
        make_task("b", TaskCategory::Backup),
        make_task("c", TaskCategory::Prune),
    ]);
    assert_eq!(added, 2);
    let err = err.unwrap();
    assert!(matches!(&err, SchedulerError::DuplicatesSkipped(v) if v.len() == 1));
    assert!(err.to_string().contains("task b already in queue"));
    assert_eq!(q.size(), 3);
}

#[test]
fn test_enqueue_multiple_without_duplicates_has_no_error() {
    let q = InMemoryQueue::new();
    let (added, err) = q.enqueue_multiple(vec![
        make_task("a", TaskCategory::Backup),
        make_task("b", TaskCategory::Check),
    ]);
    assert_eq!(added, 2);
    assert!(err.is_none());
}

#[test]
fn test_dequeue_empty_returns_none() {
    let q = InMemoryQueue::new();
    assert!(q.dequeue().is_none());
    assert!(q.peek().is_none());
    assert!(q.is_empty());
}

#[test]
fn test_enqueue_dequeue_preserves_task() {
    let q = InMemoryQueue::new();
    let mut task = make_task("a", TaskCategory::Prune);
    let mut retention = serde_json::Map::new();
    retention.insert("keepDaily".into(), serde_json::json!(7));
    task.retention = Some(retention);

    q.enqueue(task.clone()).unwrap();
    assert_eq!(q.peek().as_ref(), Some(&task));
    assert_eq!(q.dequeue(), Some(task));
}

#[test]
fn test_get_all_is_independent_copy() {
    let q = InMemoryQueue::new();
    q.enqueue(make_task("a", TaskCategory::Backup)).unwrap();
    q.enqueue(make_task("b", TaskCategory::Check)).unwrap();

    let mut all = q.get_all();
    all.clear();
    all.push(make_task("z", TaskCategory::Prune));

    assert_eq!(q.size(), 2);
    assert_eq!(q.dequeue().unwrap().task_id, "a");
    assert_eq!(q.dequeue().unwrap().task_id, "b");
}

#[test]
fn test_remove_and_contains() {
    let q = InMemoryQueue::new();
    q.enqueue(make_task("a", TaskCategory::Backup)).unwrap();
    q.enqueue(make_task("b", TaskCategory::Backup)).unwrap();

    assert!(q.contains("b"));
    assert!(q.remove("b"));
    assert!(!q.contains("b"));
    assert!(!q.remove("missing"));
    assert_eq!(q.size(), 1);
}

#[test]
fn test_concurrent_enqueue_deduplicates() {
    let q = Arc::new(InMemoryQueue::new());
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                (0..50)
                    .filter(|i| {
                        q.enqueue(make_task(&format!("t{i}"), TaskCategory::Backup))
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();
    let added: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
    assert_eq!(added, 50);
    assert_eq!(q.size(), 50);
}

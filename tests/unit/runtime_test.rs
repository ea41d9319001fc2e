//! Tests for runtime adapters and heartbeat payloads

use fleet_agent::core::{AdmissionController, Spawn, TaskCategory};
use fleet_agent::runtime::tokio_spawner::TokioSpawner;
use fleet_agent::runtime::HeartbeatPayload;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_heartbeat_reports_host_platform() {
    let hb = HeartbeatPayload::new("2.1.0", Duration::from_secs(3600));
    assert_eq!(hb.os, std::env::consts::OS);
    assert_eq!(hb.arch, std::env::consts::ARCH);
    assert_eq!(hb.uptime_seconds, 3600);
}

#[tokio::test]
async fn test_heartbeat_wire_format_with_load() {
    let ctl = AdmissionController::new(
        3,
        [
            (TaskCategory::Backup, 1),
            (TaskCategory::Check, 1),
            (TaskCategory::Prune, 1),
        ],
    );
    let _guard = ctl.acquire("b1", TaskCategory::Backup).await.unwrap();

    let hb = HeartbeatPayload::new("2.1.0", Duration::ZERO).with_load(&ctl.load_snapshot());
    let json = serde_json::to_value(&hb).unwrap();

    assert_eq!(json["currentTasksCount"], 1);
    assert_eq!(json["availableSlots"], 2);
    assert_eq!(json["runningTaskTypes"][0]["taskType"], "backup");
    assert_eq!(json["runningTaskTypes"][0]["count"], 1);
    let by_type = json["availableSlotsByType"].as_array().unwrap();
    assert_eq!(by_type.len(), 3);
    assert_eq!(by_type[0]["available"], 0);
    assert_eq!(by_type[0]["maximum"], 1);

    let back: HeartbeatPayload = serde_json::from_value(json).unwrap();
    assert_eq!(back, hb);
}

//! Runtime adapters and orchestrator API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{HeartbeatPayload, TaskTypeCapacity, TaskTypeCount};
pub use tokio_spawner::TokioSpawner;

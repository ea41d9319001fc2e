//! # Fleet Agent
//!
//! Scheduling core for a backup fleet worker agent.
//!
//! The agent polls an orchestrator for work, keeps fetched tasks in a
//! deduplicated FIFO queue and executes them under a hierarchical concurrency
//! budget: a total slot limit plus one limit per task category. Failed attempts
//! are retried with capped exponential backoff unless the error is permanent.
//!
//! ## Components
//!
//! - **Backoff Policy** (`core::backoff`): delay computation, retry decisions,
//!   failure classification.
//! - **Admission Controller** (`core::admission`): category-then-total semaphore
//!   acquisition with an RAII guard, so a slot is never leaked.
//! - **Task Queue** (`core::queue`, `infra::queue`): FIFO, rejects repeat
//!   identifiers.
//! - **Polling Loop** (`core::scheduler`): heartbeat, fetch and enqueue on a
//!   fixed interval; cancellable; tolerant of orchestrator failures.
//! - **Dispatcher** (`core::dispatcher`): runs queued tasks with retry.
//! - **Metrics** (`core::metrics`): loop and execution counters with
//!   serializable snapshots.
//!
//! Network access, process execution and persistence are supplied by the
//! embedding application through the traits in `core::executor`.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleet_agent::builders::build_agent;
//! use fleet_agent::config::{load_dotenv, AgentConfig};
//! use fleet_agent::runtime::TokioSpawner;
//! use tokio_util::sync::CancellationToken;
//!
//! load_dotenv();
//! let mut cfg = AgentConfig::default();
//! cfg.apply_env_overrides()?;
//!
//! let agent = build_agent(
//!     &cfg,
//!     Arc::new(my_heartbeat_client),
//!     Arc::new(my_task_client),
//!     my_executor,
//!     TokioSpawner::current(),
//!     None,
//! )?;
//! agent.run(CancellationToken::new()).await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models for the agent, concurrency limits and retries.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters for queue storage.
pub mod infra;
/// Runtime adapters and orchestrator API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

//! Builders wiring scheduling components from configuration.

pub mod agent_builder;

pub use agent_builder::{build_agent, Agent};

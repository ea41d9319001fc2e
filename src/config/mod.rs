//! Configuration models for the agent, concurrency limits and retries.

pub mod agent;

pub use agent::{load_dotenv, AgentConfig, ConcurrencyConfig, RetryConfig};

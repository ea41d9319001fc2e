//! Infrastructure adapters for queue storage.

pub mod queue;

pub use queue::InMemoryQueue;

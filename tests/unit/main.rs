//! Unit tests for individual components

mod backoff_test;
mod builders_test;
mod config_test;
mod error_test;
mod metrics_test;
mod queue_test;
mod runtime_test;

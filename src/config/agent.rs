//! Agent, concurrency and retry configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{BackoffPolicy, TaskCategory};

/// Shortest accepted polling interval, in seconds.
pub const MIN_POLLING_INTERVAL_SECS: u64 = 5;
/// Longest accepted polling interval, in seconds.
pub const MAX_POLLING_INTERVAL_SECS: u64 = 3600;
/// Upper bound on `max_concurrent_tasks`.
pub const MAX_CONCURRENT_TASKS_LIMIT: u32 = 100;
/// Upper bound on `bandwidth_limit_mbps`.
pub const MAX_BANDWIDTH_MBPS: u32 = 100_000;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "FLEET_AGENT_";

/// Load `.env` from the working directory, ignoring a missing file.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Concurrency limits, as exchanged with the orchestrator.
///
/// A per-category limit of `0` leaves that category bounded by the total only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcurrencyConfig {
    /// Total concurrently executing tasks (1-100).
    pub max_concurrent_tasks: u32,
    /// Concurrent backups.
    pub max_concurrent_backups: u32,
    /// Concurrent checks.
    pub max_concurrent_checks: u32,
    /// Concurrent prunes.
    pub max_concurrent_prunes: u32,
    /// CPU quota handed to the executor (1-100).
    pub cpu_quota_percent: u32,
    /// Optional bandwidth cap handed to the executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_limit_mbps: Option<u32>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            max_concurrent_backups: 1,
            max_concurrent_checks: 1,
            max_concurrent_prunes: 1,
            cpu_quota_percent: 50,
            bandwidth_limit_mbps: None,
        }
    }
}

impl ConcurrencyConfig {
    /// Validate limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_tasks == 0 {
            return Err("maxConcurrentTasks must be positive".into());
        }
        if self.max_concurrent_tasks > MAX_CONCURRENT_TASKS_LIMIT {
            return Err(format!(
                "maxConcurrentTasks cannot exceed {MAX_CONCURRENT_TASKS_LIMIT}"
            ));
        }
        if !(1..=100).contains(&self.cpu_quota_percent) {
            return Err("cpuQuotaPercent must be between 1 and 100".into());
        }
        if let Some(bw) = self.bandwidth_limit_mbps {
            if bw == 0 {
                return Err("bandwidthLimitMbps must be positive if set".into());
            }
            if bw > MAX_BANDWIDTH_MBPS {
                return Err(format!("bandwidthLimitMbps cannot exceed {MAX_BANDWIDTH_MBPS}"));
            }
        }
        let per_category = u64::from(self.max_concurrent_backups)
            + u64::from(self.max_concurrent_checks)
            + u64::from(self.max_concurrent_prunes);
        if per_category > u64::from(self.max_concurrent_tasks) {
            return Err(format!(
                "sum of per-type limits ({per_category}) exceeds total limit ({})",
                self.max_concurrent_tasks
            ));
        }
        Ok(())
    }

    /// Overlay `update`: non-zero counts and a set bandwidth replace the
    /// current values, everything else is kept.
    #[must_use]
    pub fn merge(&self, update: &Self) -> Self {
        let pick = |new: u32, old: u32| if new > 0 { new } else { old };
        Self {
            max_concurrent_tasks: pick(update.max_concurrent_tasks, self.max_concurrent_tasks),
            max_concurrent_backups: pick(
                update.max_concurrent_backups,
                self.max_concurrent_backups,
            ),
            max_concurrent_checks: pick(update.max_concurrent_checks, self.max_concurrent_checks),
            max_concurrent_prunes: pick(update.max_concurrent_prunes, self.max_concurrent_prunes),
            cpu_quota_percent: pick(update.cpu_quota_percent, self.cpu_quota_percent),
            bandwidth_limit_mbps: update.bandwidth_limit_mbps.or(self.bandwidth_limit_mbps),
        }
    }

    /// Limit configured for `category` (`0` = none).
    pub const fn limit_for(&self, category: TaskCategory) -> u32 {
        match category {
            TaskCategory::Backup => self.max_concurrent_backups,
            TaskCategory::Check => self.max_concurrent_checks,
            TaskCategory::Prune => self.max_concurrent_prunes,
        }
    }

    /// Per-category limits as admission capacities.
    pub fn category_capacities(&self) -> Vec<(TaskCategory, usize)> {
        TaskCategory::ALL
            .into_iter()
            .map(|c| (c, self.limit_for(c) as usize))
            .collect()
    }
}

/// Retry behavior for failed task attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts allowed per task.
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_secs: u64,
    /// Cap on any retry delay, in seconds.
    pub max_delay_secs: u64,
    /// Jitter factor in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 5,
            max_delay_secs: 60,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Validate retry values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.base_delay_secs == 0 {
            return Err("base_delay_secs must be greater than 0".into());
        }
        if self.max_delay_secs < self.base_delay_secs {
            return Err("max_delay_secs must not be less than base_delay_secs".into());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0".into());
        }
        Ok(())
    }

    /// Backoff parameters derived from this config.
    pub const fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            jitter: self.jitter,
        }
    }
}

/// Root agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between polling iterations (5-3600).
    pub polling_interval_secs: u64,
    /// Version reported in heartbeats.
    pub agent_version: String,
    /// Per-attempt execution limit in seconds; unset means no limit.
    pub execution_timeout_secs: Option<u64>,
    /// Concurrency limits.
    pub concurrency: ConcurrencyConfig,
    /// Retry behavior.
    pub retry: RetryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: 30,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            execution_timeout_secs: None,
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_POLLING_INTERVAL_SECS..=MAX_POLLING_INTERVAL_SECS)
            .contains(&self.polling_interval_secs)
        {
            return Err(format!(
                "polling_interval_secs must be between {MIN_POLLING_INTERVAL_SECS} \
                 and {MAX_POLLING_INTERVAL_SECS}"
            ));
        }
        if self.agent_version.is_empty() {
            return Err("agent_version cannot be empty".into());
        }
        if self.execution_timeout_secs == Some(0) {
            return Err("execution_timeout_secs must be greater than 0 if set".into());
        }
        self.concurrency
            .validate()
            .map_err(|e| format!("concurrency invalid: {e}"))?;
        self.retry
            .validate()
            .map_err(|e| format!("retry invalid: {e}"))?;
        Ok(())
    }

    /// Parse agent configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `FLEET_AGENT_*` overrides from the process environment.
    ///
    /// Call [`load_dotenv`] first to pick up a `.env` file.
    pub fn apply_env_overrides(&mut self) -> Result<(), String> {
        self.apply_overrides_from(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Apply overrides using `lookup` to resolve variable names.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Result<Option<T>, String> {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|v| {
                    v.trim()
                        .parse()
                        .map_err(|_| format!("{key}: invalid value `{v}`"))
                })
                .transpose()
        }

        if let Some(v) = parsed(&lookup, "POLLING_INTERVAL")? {
            self.polling_interval_secs = v;
        }
        if let Some(v) = lookup(&format!("{ENV_PREFIX}VERSION")) {
            self.agent_version = v;
        }
        if let Some(v) = parsed(&lookup, "EXECUTION_TIMEOUT")? {
            self.execution_timeout_secs = Some(v);
        }
        if let Some(v) = parsed(&lookup, "MAX_CONCURRENT_TASKS")? {
            self.concurrency.max_concurrent_tasks = v;
        }
        if let Some(v) = parsed(&lookup, "MAX_CONCURRENT_BACKUPS")? {
            self.concurrency.max_concurrent_backups = v;
        }
        if let Some(v) = parsed(&lookup, "MAX_CONCURRENT_CHECKS")? {
            self.concurrency.max_concurrent_checks = v;
        }
        if let Some(v) = parsed(&lookup, "MAX_CONCURRENT_PRUNES")? {
            self.concurrency.max_concurrent_prunes = v;
        }
        if let Some(v) = parsed(&lookup, "CPU_QUOTA_PERCENT")? {
            self.concurrency.cpu_quota_percent = v;
        }
        if let Some(v) = parsed(&lookup, "BANDWIDTH_LIMIT_MBPS")? {
            self.concurrency.bandwidth_limit_mbps = Some(v);
        }
        if let Some(v) = parsed(&lookup, "MAX_RETRIES")? {
            self.retry.max_attempts = v;
        }
        Ok(())
    }

    /// Polling interval as a `Duration`.
    pub const fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    /// Execution timeout as a `Duration`, if set.
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_secs.map(Duration::from_secs)
    }
}

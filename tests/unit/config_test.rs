//! Tests for configuration validation

use fleet_agent::config::{AgentConfig, ConcurrencyConfig, RetryConfig};
use std::time::Duration;

#[test]
fn test_agent_config_defaults() {
    let cfg = AgentConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.polling_interval_secs, 30);
    assert_eq!(cfg.retry, RetryConfig::default());
    assert!(cfg.execution_timeout().is_none());
}

#[test]
fn test_polling_interval_bounds() {
    let mut cfg = AgentConfig::default();
    cfg.polling_interval_secs = 5;
    assert!(cfg.validate().is_ok());
    cfg.polling_interval_secs = 3600;
    assert!(cfg.validate().is_ok());
    cfg.polling_interval_secs = 4;
    assert!(cfg.validate().is_err());
    cfg.polling_interval_secs = 3601;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_execution_timeout_rejected() {
    let cfg = AgentConfig {
        execution_timeout_secs: Some(0),
        ..AgentConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = AgentConfig {
        execution_timeout_secs: Some(3600),
        ..AgentConfig::default()
    };
    assert_eq!(cfg.execution_timeout(), Some(Duration::from_secs(3600)));
}

#[test]
fn test_per_type_sum_equal_to_total_is_valid() {
    let cfg = ConcurrencyConfig {
        max_concurrent_tasks: 3,
        max_concurrent_backups: 1,
        max_concurrent_checks: 1,
        max_concurrent_prunes: 1,
        cpu_quota_percent: 50,
        bandwidth_limit_mbps: None,
    };
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_per_type_sum_exceeding_total_is_invalid() {
    let cfg = ConcurrencyConfig {
        max_concurrent_tasks: 2,
        max_concurrent_backups: 2,
        max_concurrent_checks: 2,
        max_concurrent_prunes: 2,
        cpu_quota_percent: 50,
        bandwidth_limit_mbps: None,
    };
    assert!(cfg.validate().unwrap_err().contains("exceeds total limit"));
}

#[test]
fn test_negative_limit_rejected_at_parse() {
    let json = r#"{"concurrency": {"maxConcurrentBackups": -1}}"#;
    assert!(AgentConfig::from_json_str(json)
        .unwrap_err()
        .starts_with("parse error"));
}

#[test]
fn test_concurrency_wire_names() {
    let json = serde_json::to_value(ConcurrencyConfig::default()).unwrap();
    assert_eq!(json["maxConcurrentTasks"], 3);
    assert_eq!(json["cpuQuotaPercent"], 50);
    assert!(json.get("bandwidthLimitMbps").is_none());
}

#[test]
fn test_merge_keeps_bandwidth_when_unset() {
    let base = ConcurrencyConfig {
        bandwidth_limit_mbps: Some(100),
        ..ConcurrencyConfig::default()
    };
    let update = ConcurrencyConfig {
        max_concurrent_tasks: 0,
        max_concurrent_backups: 0,
        max_concurrent_checks: 0,
        max_concurrent_prunes: 0,
        cpu_quota_percent: 0,
        bandwidth_limit_mbps: None,
    };
    assert_eq!(base.merge(&update), base);
}

#[test]
fn test_retry_config_validation() {
    assert!(RetryConfig {
        jitter: 1.5,
        ..RetryConfig::default()
    }
    .validate()
    .is_err());
    assert!(RetryConfig {
        max_delay_secs: 1,
        ..RetryConfig::default()
    }
    .validate()
    .is_err());
    let policy = RetryConfig::default().backoff_policy();
    assert_eq!(policy.base_delay, Duration::from_secs(5));
    assert_eq!(policy.max_delay, Duration::from_secs(60));
}

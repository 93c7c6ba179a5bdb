//! Tests for configuration validation

use prometheus_job_lot::config::{SchedulerConfig, ThrottleConfig};
use prometheus_job_lot::core::RetryPolicy;

#[test]
fn test_default_config_is_valid() {
    assert!(SchedulerConfig::default().validate().is_ok());
}

#[test]
fn test_config_invalid_worker_count() {
    let mut config = SchedulerConfig::default();
    config.worker.worker_count = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_invalid_poll_interval() {
    let mut config = SchedulerConfig::default();
    config.worker.poll_interval_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_invalid_scan_interval() {
    let mut config = SchedulerConfig::default();
    config.dirmon.scan_interval_secs = 0;
    assert!(config.validate().is_err());
    config.dirmon.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_invalid_throttle_limit() {
    let mut config = SchedulerConfig::default();
    config.throttles.insert(
        "Import".into(),
        ThrottleConfig {
            max_running: Some(0),
            ..ThrottleConfig::default()
        },
    );
    let err = config.validate().unwrap_err();
    assert!(err.contains("Import"));
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "worker": { "worker_count": 4, "poll_interval_ms": 250, "name_prefix": "node-a" },
        "retry": { "max_attempts": 3, "policy": "reschedule" },
        "dirmon": { "enabled": true, "scan_interval_secs": 10 },
        "throttles": {
            "Import": { "max_running": 2, "per_group": true },
            "Export": { "disabled": ["running_jobs_limit"] }
        }
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.worker.worker_count, 4);
    assert_eq!(config.worker.name_prefix, "node-a");
    assert_eq!(config.retry.policy, RetryPolicy::Reschedule);
    assert_eq!(config.throttles["Import"].max_running, Some(2));
    assert!(config.throttles["Import"].per_group);
    assert_eq!(config.throttles["Export"].disabled, ["running_jobs_limit"]);
}

#[test]
fn test_scheduler_config_partial_json_uses_defaults() {
    let config = SchedulerConfig::from_json_str(r#"{ "retry": { "max_attempts": 1 } }"#).unwrap();
    assert_eq!(config.retry.max_attempts, 1);
    assert_eq!(config.retry.policy, RetryPolicy::PreserveSchedule);
    assert_eq!(config.worker, SchedulerConfig::default().worker);
}

#[test]
fn test_scheduler_config_rejects_bad_json() {
    let err = SchedulerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

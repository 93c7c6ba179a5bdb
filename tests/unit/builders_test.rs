//! Tests for builder modules

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_job_lot::builders::JobSystemBuilder;
use prometheus_job_lot::config::ThrottleConfig;
use prometheus_job_lot::core::{
    JobEvent, JobRecord, JobState, NewJob, RunningJobsLimit, SchedulerError, TransitionHook,
};
use prometheus_job_lot::infra::{InMemoryFileSystem, InMemoryStore};

use crate::common::{config, config_with_bulk_limit, job_types, T0};

#[derive(Default)]
struct Transitions(Mutex<Vec<(JobState, JobState)>>);

impl TransitionHook for Transitions {
    fn after(&self, job: &JobRecord, from: JobState, _event: &JobEvent) {
        self.0.lock().push((from, job.state));
    }
}

fn build(
    builder: JobSystemBuilder,
) -> Result<prometheus_job_lot::builders::JobSystem, SchedulerError> {
    builder.build(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryFileSystem::new()),
    )
}

#[test]
fn test_builder_installs_configured_limits() {
    let system = build(JobSystemBuilder::new(config_with_bulk_limit(3), job_types()).without_log_audit()).unwrap();
    assert!(system.throttles.is_defined("Bulk", RunningJobsLimit::NAME));
    assert_eq!(system.throttles.is_enabled("Bulk", RunningJobsLimit::NAME), Some(true));
    // Handler defaults are installed alongside.
    assert!(system.throttles.is_defined("Serial", RunningJobsLimit::NAME));
    assert!(!system.throttles.is_defined("Sum", RunningJobsLimit::NAME));
}

#[test]
fn test_builder_applies_configured_disables() {
    let mut cfg = config();
    cfg.throttles.insert(
        "Serial".into(),
        ThrottleConfig {
            disabled: vec![RunningJobsLimit::NAME.into()],
            ..ThrottleConfig::default()
        },
    );
    let system = build(JobSystemBuilder::new(cfg, job_types()).without_log_audit()).unwrap();
    assert_eq!(system.throttles.is_enabled("Serial", RunningJobsLimit::NAME), Some(false));
}

#[test]
fn test_builder_rejects_disable_of_unknown_throttle() {
    let mut cfg = config();
    cfg.throttles.insert(
        "Sum".into(),
        ThrottleConfig {
            disabled: vec!["nightly_window".into()],
            ..ThrottleConfig::default()
        },
    );
    let err = build(JobSystemBuilder::new(cfg, job_types())).err().unwrap();
    assert!(matches!(
        err,
        SchedulerError::ThrottleMisconfiguration { ref throttle, .. } if throttle == "nightly_window"
    ));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut cfg = config();
    cfg.worker.worker_count = 0;
    let err = build(JobSystemBuilder::new(cfg, job_types())).err().unwrap();
    assert!(err.to_string().contains("worker_count"));
}

#[test]
fn test_builder_wires_extra_hooks() {
    let hook = Arc::new(Transitions::default());
    let system = build(JobSystemBuilder::new(config(), job_types()).with_hook(hook.clone())).unwrap();
    assert_eq!(system.config.retry.max_attempts, 2);
    assert_eq!(system.machine.max_attempts(), 2);

    let job = system.machine.create(NewJob::new("Bulk"), T0).unwrap();
    system.scheduler.claim_any("w1", T0).unwrap().unwrap();
    system.machine.pause(job.id, T0).unwrap();

    assert_eq!(
        *hook.0.lock(),
        [
            (JobState::Queued, JobState::Running),
            (JobState::Running, JobState::Paused)
        ]
    );
}

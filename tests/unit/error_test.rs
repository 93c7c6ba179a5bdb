//! Tests for error types

use prometheus_job_lot::core::{JobState, SchedulerError, ValidationErrors};
use prometheus_job_lot::util::JobId;

#[test]
fn test_validation_error() {
    let mut errors = ValidationErrors::new();
    errors.add("arguments", "There must be 2 argument(s)");
    let err = SchedulerError::Validation(errors);
    assert_eq!(
        format!("{err}"),
        "validation failed: arguments: There must be 2 argument(s)"
    );
}

#[test]
fn test_illegal_transition_error() {
    let job_id = JobId::new();
    let err = SchedulerError::IllegalTransition {
        job_id,
        from: JobState::Completed,
        event: "retry",
    };
    assert!(err.is_illegal_transition());
    assert_eq!(
        format!("{err}"),
        format!("illegal transition for job {job_id}: cannot retry from completed")
    );
}

#[test]
fn test_throttle_misconfiguration_error() {
    let err = SchedulerError::ThrottleMisconfiguration {
        throttle: "running_jobs_limit".into(),
        reason: "store offline".into(),
    };
    assert!(!err.is_illegal_transition());
    assert_eq!(
        format!("{err}"),
        "throttle `running_jobs_limit` misconfigured: store offline"
    );
}

#[test]
fn test_scan_error() {
    let err = SchedulerError::Scan {
        pattern: "/in/[a-".into(),
        reason: "unclosed character class".into(),
    };
    assert_eq!(format!("{err}"), "scan of `/in/[a-` failed: unclosed character class");
}

#[test]
fn test_not_found_error() {
    let err = SchedulerError::NotFound("job 1".into());
    assert_eq!(format!("{err}"), "not found: job 1");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("disk full".into());
    assert_eq!(format!("{err}"), "backend error: disk full");
}

//! Tests for the operator surface

use prometheus_job_lot::core::{DirmonEntry, DirmonState, JobQuery, JobState, NewJob, SchedulerError};
use prometheus_job_lot::runtime::EntryEdit;
use prometheus_job_lot::util::JobId;
use serde_json::json;

use crate::common::{config, harness, T0};

#[test]
fn test_submit_and_status() {
    let h = harness(config());
    let submitted = h
        .system
        .operator
        .submit(NewJob::new("Sum").with_arguments(vec![json!(1)]), T0)
        .unwrap();
    assert_eq!(submitted.state, JobState::Queued);
    assert_eq!(submitted.attempts, 0);

    let status = h.system.operator.status(submitted.job_id).unwrap();
    assert_eq!(status, submitted);
}

#[test]
fn test_submit_rejects_wrong_arity() {
    let h = harness(config());
    let err = h.system.operator.submit(NewJob::new("Sum"), T0).unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));
    assert!(h.system.operator.list_jobs(&JobQuery::new()).unwrap().is_empty());
}

#[test]
fn test_status_of_unknown_job() {
    let h = harness(config());
    let err = h.system.operator.status(JobId::new()).unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound(_)));
}

#[test]
fn test_manual_transitions() {
    let h = harness(config());
    let job = h.system.operator.submit(NewJob::new("Bulk"), T0).unwrap();
    h.system.scheduler.claim_any("w1", T0).unwrap().unwrap();

    let paused = h.system.operator.pause(job.job_id, T0).unwrap();
    assert_eq!(paused.state, JobState::Paused);
    assert_eq!(paused.claimed_by, None);
    assert!(h.system.operator.pause(job.job_id, T0).unwrap_err().is_illegal_transition());

    assert_eq!(h.system.operator.resume(job.job_id, T0).unwrap().state, JobState::Queued);
    assert_eq!(h.system.operator.abort(job.job_id, T0).unwrap().state, JobState::Aborted);
    assert!(h.system.operator.retry(job.job_id, T0).unwrap_err().is_illegal_transition());
}

#[test]
fn test_retry_limit() {
    let h = harness(config());
    let job = h.system.operator.submit(NewJob::new("Bulk"), T0).unwrap();
    for _ in 0..2 {
        let claimed = h.system.scheduler.claim_any("w1", T0).unwrap().unwrap();
        h.system.machine.fail(&claimed, "flaky", T0).unwrap();
        h.system.operator.retry(job.job_id, T0).unwrap();
    }
    let claimed = h.system.scheduler.claim_any("w1", T0).unwrap().unwrap();
    h.system.machine.fail(&claimed, "flaky", T0).unwrap();

    // max_attempts is 2 in the test config.
    assert!(h.system.operator.retry(job.job_id, T0).is_err());
    let status = h.system.operator.status(job.job_id).unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 2);
}

#[test]
fn test_list_jobs_by_state() {
    let h = harness(config());
    for _ in 0..3 {
        h.system.operator.submit(NewJob::new("Bulk"), T0).unwrap();
    }
    h.system.scheduler.claim_any("w1", T0).unwrap().unwrap();

    let running = h
        .system
        .operator
        .list_jobs(&JobQuery::new().in_state(JobState::Running))
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].claimed_by.as_deref(), Some("w1"));
    assert_eq!(h.system.operator.list_jobs(&JobQuery::new()).unwrap().len(), 3);
}

#[test]
fn test_entry_lifecycle() {
    let h = harness(config());
    let entry = h
        .system
        .operator
        .create_entry(DirmonEntry::new("/in/*.csv", "Sum").with_arguments(vec![json!(1)]))
        .unwrap();
    assert_eq!(entry.state, DirmonState::Enabled);

    h.system.operator.disable_entry(entry.id).unwrap();
    assert_eq!(
        h.system.operator.list_entries(Some(DirmonState::Disabled)).unwrap().len(),
        1
    );
    assert!(h.system.operator.list_entries(Some(DirmonState::Enabled)).unwrap().is_empty());

    let edited = h
        .system
        .operator
        .edit_entry(
            entry.id,
            &EntryEdit {
                name: Some("inbox".into()),
                pattern: Some("/in/**/*.csv".into()),
                ..EntryEdit::default()
            },
        )
        .unwrap();
    assert_eq!(edited.name.as_deref(), Some("inbox"));
    assert_eq!(edited.pattern, "/in/**/*.csv");
    assert_eq!(edited.state, DirmonState::Disabled);

    assert_eq!(h.system.operator.enable_entry(entry.id).unwrap().state, DirmonState::Enabled);
}

#[test]
fn test_create_entry_rejects_unknown_job_type() {
    let h = harness(config());
    let err = h
        .system
        .operator
        .create_entry(DirmonEntry::new("/in/*.csv", "Missing"))
        .unwrap_err();
    let SchedulerError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert!(!errors.on("job_type").is_empty());
    assert!(h.system.operator.list_entries(None).unwrap().is_empty());
}

#[test]
fn test_throttle_toggles_and_health() {
    let h = harness(config());
    assert!(h.system.operator.disable_throttle("Sum", "missing").is_err());
    h.system.operator.disable_throttle("Serial", "running_jobs_limit").unwrap();
    h.system.operator.enable_throttle("Serial", "running_jobs_limit").unwrap();
    assert_eq!(
        h.system.throttles.is_enabled("Serial", "running_jobs_limit"),
        Some(true)
    );
    assert!(h.system.operator.health().ok);
}

//! Tests for utility types

use std::time::{Duration, UNIX_EPOCH};

use prometheus_job_lot::util::{after_ms, now_ms, system_time_ms, EntryId, JobId, Priority};

#[test]
fn test_priority_ordering() {
    assert!(Priority::HIGHEST < Priority::DEFAULT);
    assert!(Priority::DEFAULT < Priority::LOWEST);
    assert_eq!(Priority::default(), Priority(50));
    assert_eq!(Priority::from(7), Priority(7));
}

#[test]
fn test_job_ids_sort_by_creation() {
    let first = JobId::new();
    let second = JobId::new();
    assert!(first < second);
}

#[test]
fn test_ids_round_trip_through_strings() {
    let job = JobId::new();
    assert_eq!(job.to_string().parse::<JobId>().unwrap(), job);
    let entry = EntryId::new();
    assert_eq!(serde_json::to_value(entry).unwrap(), serde_json::json!(entry.to_string()));
}

#[test]
fn test_clock_helpers() {
    assert_eq!(system_time_ms(UNIX_EPOCH + Duration::from_millis(1_500)), 1_500);
    assert_eq!(after_ms(1_000, Duration::from_secs(2)), 3_000);
    assert!(now_ms() > 1_600_000_000_000);
}

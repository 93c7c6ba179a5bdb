//! Directory monitor integration tests over the in-memory filesystem.

mod common;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

use common::{config, harness, job_types, T0};
use prometheus_job_lot::core::{
    DirectoryMonitor, DirmonEntry, DirmonState, DirmonStore, FileMetadata, FileSystem, JobQuery,
    JobRecord, JobState, JobStore, JobVersion, MatchKey, MatchRecord, MatchStore, SchedulerError,
    StateMachine,
};
use prometheus_job_lot::infra::InMemoryStore;
use prometheus_job_lot::util::{EntryId, JobId};
use prometheus_job_lot::runtime::EntryEdit;
use serde_json::json;

fn sum_entry(pattern: &str) -> DirmonEntry {
    DirmonEntry::new(pattern, "Sum")
        .with_perform_method("sum")
        .with_arguments(vec![json!(1), json!(2)])
}

fn queued(h: &common::Harness) -> usize {
    h.store
        .count_jobs(&JobQuery::new().in_state(JobState::Queued))
        .unwrap()
}

#[test]
fn watched_file_becomes_running_job() {
    let h = harness(config());
    h.fs.write("/watched/inbox/data.csv", T0 - 100, 42);
    h.system.operator.create_entry(sum_entry("/watched/**")).unwrap();

    let report = h.system.monitor.scan(T0).unwrap();
    assert_eq!(report.spawned.len(), 1);
    let job = h.system.operator.status(report.spawned[0]).unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.job_type, "Sum");

    let claimed = h.system.scheduler.claim_any("w1", T0).unwrap().unwrap();
    assert_eq!(claimed.id, report.spawned[0]);
    assert_eq!(claimed.state, JobState::Running);
    assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));
    assert_eq!(claimed.perform_method, "sum");
    assert_eq!(claimed.arguments.len(), 2);
    assert_eq!(
        claimed.source_path.as_deref(),
        Some(Path::new("/watched/inbox/data.csv"))
    );
}

#[test]
fn unchanged_file_spawns_once() {
    let h = harness(config());
    h.fs.write("/watched/a.csv", T0 - 100, 10);
    h.system.operator.create_entry(sum_entry("/watched/*.csv")).unwrap();

    assert_eq!(h.system.monitor.scan(T0).unwrap().spawned.len(), 1);
    let second = h.system.monitor.scan(T0 + 1_000).unwrap();
    assert!(second.spawned.is_empty());
    assert_eq!(second.duplicates, 1);
    assert_eq!(queued(&h), 1);
}

#[test]
fn modified_file_spawns_again() {
    let h = harness(config());
    h.fs.write("/watched/a.csv", T0 - 100, 10);
    h.system.operator.create_entry(sum_entry("/watched/*.csv")).unwrap();
    h.system.monitor.scan(T0).unwrap();

    h.fs.write("/watched/a.csv", T0 + 500, 12);
    assert_eq!(h.system.monitor.scan(T0 + 1_000).unwrap().spawned.len(), 1);
    assert_eq!(queued(&h), 2);
}

#[test]
fn only_matching_files_spawn() {
    let h = harness(config());
    h.fs.write("/srv/in/a.csv", T0, 1);
    h.fs.write("/srv/in/b.txt", T0, 1);
    h.fs.write("/srv/in/nested/c.csv", T0, 1);
    h.system.operator.create_entry(sum_entry("/srv/in/*.csv")).unwrap();

    let report = h.system.monitor.scan(T0).unwrap();
    assert_eq!(report.spawned.len(), 1);
    let job = h.system.operator.status(report.spawned[0]).unwrap();
    assert_eq!(job.job_type, "Sum");
    let stored = h.store.get_job(report.spawned[0]).unwrap().unwrap();
    assert_eq!(stored.source_path, Some(PathBuf::from("/srv/in/a.csv")));
}

#[test]
fn missing_root_is_an_empty_scan() {
    let h = harness(config());
    let entry = h.system.operator.create_entry(sum_entry("/nowhere/**")).unwrap();
    let report = h.system.monitor.scan(T0).unwrap();
    assert!(report.spawned.is_empty());
    assert!(report.failed_entries.is_empty());
    let stored = h.system.operator.entry(entry.id).unwrap();
    assert_eq!(stored.state, DirmonState::Enabled);
    assert_eq!(stored.last_scanned_ms, Some(T0));
}

#[test]
fn arity_mismatch_names_expected_count() {
    let h = harness(config());
    let err = h
        .system
        .operator
        .create_entry(DirmonEntry::new("/watched/**", "Sum").with_perform_method("sum"))
        .unwrap_err();
    let SchedulerError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.on("arguments"), ["There must be 2 argument(s)".to_string()]);

    let err = h
        .system
        .operator
        .create_entry(DirmonEntry::new("/watched/**", "Sum"))
        .unwrap_err();
    assert!(err.to_string().contains("There must be 1 argument(s)"));
}

#[test]
fn broken_entry_fails_without_stopping_the_pass() {
    let h = harness(config());
    h.fs.write("/good/a.csv", T0, 1);
    h.fs.write("/bad/a.csv", T0, 1);
    // Bypass validation the way a hand-edited store record would.
    let bad = DirmonEntry::new("/bad/*.csv", "Sum").with_perform_method("sum");
    h.store.insert_entry(bad.clone()).unwrap();
    h.system.operator.create_entry(sum_entry("/good/*.csv")).unwrap();

    let report = h.system.monitor.scan(T0).unwrap();
    assert_eq!(report.spawned.len(), 1);
    assert_eq!(report.failed_entries.len(), 1);
    assert_eq!(report.failed_entries[0].0, bad.id);

    let stored = h.system.operator.entry(bad.id).unwrap();
    assert_eq!(stored.state, DirmonState::Failed);
    assert!(stored.failure.unwrap().contains("There must be 2 argument(s)"));

    // Failed entries are skipped until fixed and re-enabled.
    assert_eq!(h.system.monitor.scan(T0 + 1).unwrap().entries_scanned, 1);
    assert!(h.system.operator.enable_entry(bad.id).is_err());
    h.system
        .operator
        .edit_entry(
            bad.id,
            &EntryEdit {
                arguments: Some(vec![json!(3), json!(4)].into()),
                ..EntryEdit::default()
            },
        )
        .unwrap();
    let enabled = h.system.operator.enable_entry(bad.id).unwrap();
    assert_eq!(enabled.failure, None);
    assert_eq!(h.system.monitor.scan(T0 + 2).unwrap().spawned.len(), 1);
}

#[test]
fn disabled_entries_are_not_scanned() {
    let h = harness(config());
    h.fs.write("/watched/a.csv", T0, 1);
    let entry = h.system.operator.create_entry(sum_entry("/watched/**")).unwrap();
    h.system.operator.disable_entry(entry.id).unwrap();

    let report = h.system.monitor.scan(T0).unwrap();
    assert_eq!(report.entries_scanned, 0);
    assert_eq!(queued(&h), 0);
}

#[test]
fn invalid_edit_leaves_entry_untouched() {
    let h = harness(config());
    let entry = h.system.operator.create_entry(sum_entry("/watched/**")).unwrap();
    let edit = EntryEdit {
        perform_method: Some("perform".into()),
        ..EntryEdit::default()
    };
    assert!(h.system.operator.edit_entry(entry.id, &edit).is_err());
    assert_eq!(h.system.operator.entry(entry.id).unwrap().perform_method, "sum");
}

#[test]
fn literal_pattern_watches_one_file() {
    let h = harness(config());
    h.system.operator.create_entry(sum_entry("/drop/ready.flag")).unwrap();
    assert!(h.system.monitor.scan(T0).unwrap().spawned.is_empty());

    h.fs.write("/drop/ready.flag", T0 + 10, 0);
    h.fs.write("/drop/other.flag", T0 + 10, 0);
    assert_eq!(h.system.monitor.scan(T0 + 20).unwrap().spawned.len(), 1);
}

#[test]
fn concurrent_monitors_spawn_each_file_once() {
    let h = harness(config());
    for i in 0..20 {
        h.fs.write(format!("/watched/{i}.csv"), T0, i);
    }
    let entry = h.system.operator.create_entry(sum_entry("/watched/*.csv")).unwrap();

    let monitors = 4;
    let barrier = Arc::new(Barrier::new(monitors));
    let handles: Vec<_> = (0..monitors)
        .map(|_| {
            // Independent monitor instances sharing one store, as separate processes would.
            let monitor = DirectoryMonitor::new(
                Arc::clone(&h.system.machine),
                h.store.clone(),
                h.store.clone(),
                h.fs.clone(),
            );
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                monitor.scan(T0).unwrap().spawned.len()
            })
        })
        .collect();
    let spawned: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(spawned, 20);
    assert_eq!(queued(&h), 20);
    assert_eq!(h.store.matches_for(entry.id).unwrap().len(), 20);
}

/// Filesystem whose directory listings are always refused.
struct DeniedListing;

impl FileSystem for DeniedListing {
    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("cannot list {}", root.display()),
        ))
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        Err(io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

#[test]
fn unreadable_root_fails_the_entry() {
    let h = harness(config());
    let entry = h.system.operator.create_entry(sum_entry("/locked/*.csv")).unwrap();
    let monitor = DirectoryMonitor::new(
        Arc::clone(&h.system.machine),
        h.store.clone(),
        h.store.clone(),
        Arc::new(DeniedListing),
    );

    let report = monitor.scan(T0).unwrap();
    assert!(report.spawned.is_empty());
    assert_eq!(report.failed_entries.len(), 1);
    assert!(report.failed_entries[0].1.contains("cannot list /locked"));

    let stored = h.system.operator.entry(entry.id).unwrap();
    assert_eq!(stored.state, DirmonState::Failed);
    assert!(stored.failure.unwrap().starts_with("scan of `/locked/*.csv` failed"));
}

/// Store that refuses new jobs and match removals; everything else is in memory.
#[derive(Default)]
struct ReadOnlyJobs {
    inner: InMemoryStore,
}

impl JobStore for ReadOnlyJobs {
    fn insert_job(&self, _job: JobRecord) -> Result<(), SchedulerError> {
        Err(SchedulerError::Backend("job table is read-only".into()))
    }

    fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, SchedulerError> {
        self.inner.get_job(id)
    }

    fn find_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, SchedulerError> {
        self.inner.find_jobs(query)
    }

    fn count_jobs(&self, query: &JobQuery) -> Result<usize, SchedulerError> {
        self.inner.count_jobs(query)
    }

    fn update_job_if(
        &self,
        id: JobId,
        expected: &JobVersion,
        apply: &(dyn Fn(&mut JobRecord) + Sync),
    ) -> Result<Option<JobRecord>, SchedulerError> {
        self.inner.update_job_if(id, expected, apply)
    }
}

impl MatchStore for ReadOnlyJobs {
    fn insert_match(&self, record: MatchRecord) -> Result<bool, SchedulerError> {
        self.inner.insert_match(record)
    }

    fn contains_match(&self, key: &MatchKey) -> Result<bool, SchedulerError> {
        self.inner.contains_match(key)
    }

    fn remove_match(&self, _key: &MatchKey) -> Result<bool, SchedulerError> {
        Err(SchedulerError::Backend("match table is read-only".into()))
    }

    fn matches_for(&self, entry_id: EntryId) -> Result<Vec<MatchRecord>, SchedulerError> {
        self.inner.matches_for(entry_id)
    }
}

#[test]
fn enqueue_failure_is_reported_even_if_the_match_sticks() {
    let h = harness(config());
    h.fs.write("/watched/a.csv", T0, 1);
    let entry = h.system.operator.create_entry(sum_entry("/watched/*.csv")).unwrap();

    let store = Arc::new(ReadOnlyJobs::default());
    let machine = Arc::new(StateMachine::new(store.clone(), Arc::new(job_types()), 2));
    let monitor = DirectoryMonitor::new(machine, h.store.clone(), store.clone(), h.fs.clone());

    let report = monitor.scan(T0).unwrap();
    assert!(report.spawned.is_empty());
    assert_eq!(report.failed_entries.len(), 1);
    let reason = &report.failed_entries[0].1;
    assert!(reason.contains("job table is read-only"), "{reason}");
    assert!(!reason.contains("match table"), "{reason}");
    assert_eq!(store.matches_for(entry.id).unwrap().len(), 1);
}

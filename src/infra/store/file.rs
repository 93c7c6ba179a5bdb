//! File-backed store using JSON lines for durability.
//!
//! Each table lives in its own `.jsonl` file under one directory and is
//! rewritten in full after every mutation, while the table's lock is still
//! held. A mutation whose rewrite fails is undone in memory before the error
//! is returned, so the tables never run ahead of the files. Records are loaded
//! back on open, so jobs, entries and matches survive a restart.

use std::fs::{create_dir_all, rename, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::core::dirmon::{DirmonEntry, DirmonState, MatchKey, MatchRecord};
use crate::core::error::SchedulerError;
use crate::core::filter::JobQuery;
use crate::core::job::{JobRecord, JobVersion};
use crate::core::store::{DirmonStore, JobStore, MatchStore};
use crate::infra::store::memory::{self, EntryTable, JobTable, MatchTable};
use crate::util::serde::{EntryId, JobId};

const JOBS_FILE: &str = "jobs.jsonl";
const ENTRIES_FILE: &str = "dirmon_entries.jsonl";
const MATCHES_FILE: &str = "matches.jsonl";

fn backend(e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::Backend(e.to_string())
}

/// Durable store writing one JSONL file per table.
pub struct JsonlStore {
    dir: PathBuf,
    jobs: Mutex<JobTable>,
    entries: Mutex<EntryTable>,
    matches: Mutex<MatchTable>,
}

impl JsonlStore {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Backend` if the directory cannot be created or an
    /// existing file cannot be parsed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).map_err(backend)?;

        let jobs: Vec<JobRecord> = load(&dir.join(JOBS_FILE))?;
        let entries: Vec<DirmonEntry> = load(&dir.join(ENTRIES_FILE))?;
        let matches: Vec<MatchRecord> = load(&dir.join(MATCHES_FILE))?;
        debug!(
            dir = %dir.display(),
            jobs = jobs.len(),
            entries = entries.len(),
            matches = matches.len(),
            "jsonl store opened"
        );

        Ok(Self {
            jobs: Mutex::new(jobs.into_iter().map(|j| (j.id, j)).collect()),
            entries: Mutex::new(entries.into_iter().map(|e| (e.id, e)).collect()),
            matches: Mutex::new(matches.into_iter().map(|m| (m.key.clone(), m)).collect()),
            dir,
        })
    }

    /// Directory holding the table files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SchedulerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = OpenOptions::new().read(true).open(path).map_err(backend)?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(backend)?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(backend)?);
    }
    Ok(records)
}

/// Write `records` to a sibling temp file, then rename it over `path`.
fn rewrite<'a, T, I>(path: &Path, records: I) -> Result<(), SchedulerError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let tmp = path.with_extension("jsonl.tmp");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .map_err(backend)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record).map_err(backend)?;
        writeln!(writer, "{line}").map_err(backend)?;
    }
    writer.flush().map_err(backend)?;
    rename(&tmp, path).map_err(backend)
}

impl JobStore for JsonlStore {
    fn insert_job(&self, job: JobRecord) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock();
        let id = job.id;
        memory::insert_job(&mut jobs, job)?;
        if let Err(err) = rewrite(&self.dir.join(JOBS_FILE), jobs.values()) {
            jobs.remove(&id);
            warn!(job_id = %id, error = %err, "job insert rolled back");
            return Err(err);
        }
        Ok(())
    }

    fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, SchedulerError> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    fn find_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, SchedulerError> {
        Ok(memory::find_jobs(&self.jobs.lock(), query))
    }

    fn count_jobs(&self, query: &JobQuery) -> Result<usize, SchedulerError> {
        Ok(memory::count_jobs(&self.jobs.lock(), query))
    }

    fn update_job_if(
        &self,
        id: JobId,
        expected: &JobVersion,
        apply: &(dyn Fn(&mut JobRecord) + Sync),
    ) -> Result<Option<JobRecord>, SchedulerError> {
        let mut jobs = self.jobs.lock();
        let Some(previous) = jobs.get(&id).cloned() else {
            return Ok(None);
        };
        let updated = memory::update_job_if(&mut jobs, id, expected, apply);
        if updated.is_some() {
            if let Err(err) = rewrite(&self.dir.join(JOBS_FILE), jobs.values()) {
                jobs.insert(id, previous);
                warn!(job_id = %id, error = %err, "job update rolled back");
                return Err(err);
            }
        }
        Ok(updated)
    }
}

impl DirmonStore for JsonlStore {
    fn insert_entry(&self, entry: DirmonEntry) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        let id = entry.id;
        memory::insert_entry(&mut entries, entry)?;
        if let Err(err) = rewrite(&self.dir.join(ENTRIES_FILE), entries.values()) {
            entries.remove(&id);
            warn!(entry_id = %id, error = %err, "dirmon entry insert rolled back");
            return Err(err);
        }
        Ok(())
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<DirmonEntry>, SchedulerError> {
        Ok(self.entries.lock().get(&id).cloned())
    }

    fn list_entries(&self, state: Option<DirmonState>) -> Result<Vec<DirmonEntry>, SchedulerError> {
        Ok(memory::list_entries(&self.entries.lock(), state))
    }

    fn update_entry(
        &self,
        id: EntryId,
        apply: &(dyn Fn(&mut DirmonEntry) + Sync),
    ) -> Result<Option<DirmonEntry>, SchedulerError> {
        let mut entries = self.entries.lock();
        let Some(previous) = entries.get(&id).cloned() else {
            return Ok(None);
        };
        let updated = memory::update_entry(&mut entries, id, apply);
        if updated.is_some() {
            if let Err(err) = rewrite(&self.dir.join(ENTRIES_FILE), entries.values()) {
                entries.insert(id, previous);
                warn!(entry_id = %id, error = %err, "dirmon entry update rolled back");
                return Err(err);
            }
        }
        Ok(updated)
    }
}

impl MatchStore for JsonlStore {
    fn insert_match(&self, record: MatchRecord) -> Result<bool, SchedulerError> {
        let mut matches = self.matches.lock();
        let key = record.key.clone();
        let won = memory::insert_match(&mut matches, record);
        if won {
            if let Err(err) = rewrite(&self.dir.join(MATCHES_FILE), matches.values()) {
                matches.remove(&key);
                warn!(path = %key.path.display(), error = %err, "match insert rolled back");
                return Err(err);
            }
        }
        Ok(won)
    }

    fn contains_match(&self, key: &MatchKey) -> Result<bool, SchedulerError> {
        Ok(self.matches.lock().contains_key(key))
    }

    fn remove_match(&self, key: &MatchKey) -> Result<bool, SchedulerError> {
        let mut matches = self.matches.lock();
        let Some(removed) = matches.remove(key) else {
            return Ok(false);
        };
        if let Err(err) = rewrite(&self.dir.join(MATCHES_FILE), matches.values()) {
            matches.insert(key.clone(), removed);
            warn!(path = %key.path.display(), error = %err, "match removal rolled back");
            return Err(err);
        }
        Ok(true)
    }

    fn matches_for(&self, entry_id: EntryId) -> Result<Vec<MatchRecord>, SchedulerError> {
        Ok(memory::matches_for(&self.matches.lock(), entry_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dirmon::Fingerprint;
    use crate::core::job::{Arguments, JobState};
    use crate::util::serde::Priority;

    fn job() -> JobRecord {
        JobRecord {
            id: JobId::new(),
            job_type: "Durable".into(),
            state: JobState::Queued,
            priority: Priority::default(),
            arguments: Arguments::from(vec![serde_json::json!(1)]),
            perform_method: "perform".into(),
            run_at_ms: 10,
            expires_at_ms: None,
            claimed_by: None,
            claimed_at_ms: None,
            created_at_ms: 10,
            completed_at_ms: None,
            result: None,
            failure: None,
            attempts: 0,
            throttle_group: None,
            source_path: None,
        }
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let queued = job();
        let entry = DirmonEntry::new("/in/*.csv", "Durable");
        let key = MatchKey {
            entry_id: entry.id,
            path: PathBuf::from("/in/a.csv"),
            fingerprint: Fingerprint {
                modified_ms: 5,
                size: 12,
            },
        };
        {
            let store = JsonlStore::open(dir.path()).unwrap();
            store.insert_job(queued.clone()).unwrap();
            store
                .update_job_if(queued.id, &queued.version(), &|j: &mut JobRecord| {
                    j.state = JobState::Running;
                    j.claimed_by = Some("w1".into());
                })
                .unwrap();
            store.insert_entry(entry.clone()).unwrap();
            assert!(store
                .insert_match(MatchRecord {
                    key: key.clone(),
                    job_id: queued.id,
                    matched_at_ms: 10,
                })
                .unwrap());
        }

        let reopened = JsonlStore::open(dir.path()).unwrap();
        let loaded = reopened.get_job(queued.id).unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Running);
        assert_eq!(loaded.claimed_by.as_deref(), Some("w1"));
        assert_eq!(reopened.get_entry(entry.id).unwrap(), Some(entry));
        assert!(reopened.contains_match(&key).unwrap());
    }

    #[test]
    fn stale_update_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let queued = job();
        store.insert_job(queued.clone()).unwrap();
        let running = JobVersion {
            state: JobState::Running,
            ..queued.version()
        };
        let stale = store
            .update_job_if(queued.id, &running, &|j: &mut JobRecord| {
                j.state = JobState::Completed;
            })
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(
            JsonlStore::open(dir.path())
                .unwrap()
                .get_job(queued.id)
                .unwrap()
                .unwrap()
                .state,
            JobState::Queued
        );
    }

    fn match_key(entry: &DirmonEntry) -> MatchKey {
        MatchKey {
            entry_id: entry.id,
            path: PathBuf::from("/in/b.csv"),
            fingerprint: Fingerprint {
                modified_ms: 7,
                size: 3,
            },
        }
    }

    #[test]
    fn failed_job_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let queued = job();
        store.insert_job(queued.clone()).unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();

        let claim = store.update_job_if(queued.id, &queued.version(), &|j: &mut JobRecord| {
            j.state = JobState::Running;
            j.claimed_by = Some("w1".into());
            j.claimed_at_ms = Some(20);
        });
        assert!(claim.is_err());
        let stored = store.get_job(queued.id).unwrap().unwrap();
        assert_eq!(stored.state, JobState::Queued);
        assert_eq!(stored.claimed_by, None);

        let extra = job();
        assert!(store.insert_job(extra.clone()).is_err());
        assert_eq!(store.get_job(extra.id).unwrap(), None);
    }

    #[test]
    fn failed_match_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let entry = DirmonEntry::new("/in/*.csv", "Durable");
        store.insert_entry(entry.clone()).unwrap();
        let kept = MatchKey {
            path: PathBuf::from("/in/a.csv"),
            ..match_key(&entry)
        };
        assert!(store
            .insert_match(MatchRecord {
                key: kept.clone(),
                job_id: JobId::new(),
                matched_at_ms: 10,
            })
            .unwrap());
        std::fs::remove_dir_all(dir.path()).unwrap();

        let key = match_key(&entry);
        let inserted = store.insert_match(MatchRecord {
            key: key.clone(),
            job_id: JobId::new(),
            matched_at_ms: 11,
        });
        assert!(inserted.is_err());
        assert!(!store.contains_match(&key).unwrap());

        assert!(store.remove_match(&kept).is_err());
        assert!(store.contains_match(&kept).unwrap());

        let renamed = store.update_entry(entry.id, &|e: &mut DirmonEntry| {
            e.name = Some("renamed".into());
        });
        assert!(renamed.is_err());
        assert_eq!(store.get_entry(entry.id).unwrap(), Some(entry));
    }
}

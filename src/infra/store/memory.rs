//! In-memory store backing all three record kinds.
//!
//! One mutex per table; every trait call holds exactly one lock for its
//! whole read-check-write, which is what makes `update_job_if` and
//! `insert_match` atomic.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::core::dirmon::{DirmonEntry, DirmonState, MatchKey, MatchRecord};
use crate::core::error::SchedulerError;
use crate::core::filter::JobQuery;
use crate::core::job::{JobRecord, JobVersion};
use crate::core::store::{DirmonStore, JobStore, MatchStore};
use crate::util::serde::{EntryId, JobId};

pub(crate) type JobTable = HashMap<JobId, JobRecord>;
pub(crate) type EntryTable = HashMap<EntryId, DirmonEntry>;
pub(crate) type MatchTable = BTreeMap<MatchKey, MatchRecord>;

// Table operations shared with the file-backed store. Callers hold the
// table's lock for the duration of each call.

pub(crate) fn insert_job(jobs: &mut JobTable, job: JobRecord) -> Result<(), SchedulerError> {
    if jobs.contains_key(&job.id) {
        return Err(SchedulerError::Backend(format!("job {} already exists", job.id)));
    }
    jobs.insert(job.id, job);
    Ok(())
}

pub(crate) fn find_jobs(jobs: &JobTable, query: &JobQuery) -> Vec<JobRecord> {
    let mut found: Vec<JobRecord> = jobs.values().filter(|job| query.matches(job)).cloned().collect();
    query.order_and_limit(&mut found);
    found
}

pub(crate) fn count_jobs(jobs: &JobTable, query: &JobQuery) -> usize {
    jobs.values().filter(|job| query.matches(job)).count()
}

pub(crate) fn update_job_if(
    jobs: &mut JobTable,
    id: JobId,
    expected: &JobVersion,
    apply: &(dyn Fn(&mut JobRecord) + Sync),
) -> Option<JobRecord> {
    let job = jobs.get_mut(&id)?;
    if !expected.matches(job) {
        return None;
    }
    apply(job);
    Some(job.clone())
}

pub(crate) fn insert_entry(entries: &mut EntryTable, entry: DirmonEntry) -> Result<(), SchedulerError> {
    if entries.contains_key(&entry.id) {
        return Err(SchedulerError::Backend(format!(
            "dirmon entry {} already exists",
            entry.id
        )));
    }
    entries.insert(entry.id, entry);
    Ok(())
}

pub(crate) fn list_entries(entries: &EntryTable, state: Option<DirmonState>) -> Vec<DirmonEntry> {
    let mut listed: Vec<DirmonEntry> = entries
        .values()
        .filter(|e| state.is_none_or(|s| e.state == s))
        .cloned()
        .collect();
    listed.sort_by_key(|e| e.id);
    listed
}

pub(crate) fn update_entry(
    entries: &mut EntryTable,
    id: EntryId,
    apply: &(dyn Fn(&mut DirmonEntry) + Sync),
) -> Option<DirmonEntry> {
    let entry = entries.get_mut(&id)?;
    apply(entry);
    Some(entry.clone())
}

pub(crate) fn insert_match(matches: &mut MatchTable, record: MatchRecord) -> bool {
    if matches.contains_key(&record.key) {
        return false;
    }
    matches.insert(record.key.clone(), record);
    true
}

pub(crate) fn matches_for(matches: &MatchTable, entry_id: EntryId) -> Vec<MatchRecord> {
    matches
        .values()
        .filter(|m| m.key.entry_id == entry_id)
        .cloned()
        .collect()
}

/// Volatile store for tests, dev and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    jobs: Mutex<JobTable>,
    entries: Mutex<EntryTable>,
    matches: Mutex<MatchTable>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job records held.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Number of match records held.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.lock().len()
    }
}

impl JobStore for InMemoryStore {
    fn insert_job(&self, job: JobRecord) -> Result<(), SchedulerError> {
        insert_job(&mut self.jobs.lock(), job)
    }

    fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, SchedulerError> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    fn find_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, SchedulerError> {
        Ok(find_jobs(&self.jobs.lock(), query))
    }

    fn count_jobs(&self, query: &JobQuery) -> Result<usize, SchedulerError> {
        Ok(count_jobs(&self.jobs.lock(), query))
    }

    fn update_job_if(
        &self,
        id: JobId,
        expected: &JobVersion,
        apply: &(dyn Fn(&mut JobRecord) + Sync),
    ) -> Result<Option<JobRecord>, SchedulerError> {
        Ok(update_job_if(&mut self.jobs.lock(), id, expected, apply))
    }
}

impl DirmonStore for InMemoryStore {
    fn insert_entry(&self, entry: DirmonEntry) -> Result<(), SchedulerError> {
        insert_entry(&mut self.entries.lock(), entry)
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<DirmonEntry>, SchedulerError> {
        Ok(self.entries.lock().get(&id).cloned())
    }

    fn list_entries(&self, state: Option<DirmonState>) -> Result<Vec<DirmonEntry>, SchedulerError> {
        Ok(list_entries(&self.entries.lock(), state))
    }

    fn update_entry(
        &self,
        id: EntryId,
        apply: &(dyn Fn(&mut DirmonEntry) + Sync),
    ) -> Result<Option<DirmonEntry>, SchedulerError> {
        Ok(update_entry(&mut self.entries.lock(), id, apply))
    }
}

impl MatchStore for InMemoryStore {
    fn insert_match(&self, record: MatchRecord) -> Result<bool, SchedulerError> {
        Ok(insert_match(&mut self.matches.lock(), record))
    }

    fn contains_match(&self, key: &MatchKey) -> Result<bool, SchedulerError> {
        Ok(self.matches.lock().contains_key(key))
    }

    fn remove_match(&self, key: &MatchKey) -> Result<bool, SchedulerError> {
        Ok(self.matches.lock().remove(key).is_some())
    }

    fn matches_for(&self, entry_id: EntryId) -> Result<Vec<MatchRecord>, SchedulerError> {
        Ok(matches_for(&self.matches.lock(), entry_id))
    }
}

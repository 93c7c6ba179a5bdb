//! Durable store abstractions consumed by the scheduler.
//!
//! Implementations must provide three primitives: filtered/sorted/limited
//! queries, a conditional update that applies only while a record is still in
//! an expected version, and a first-writer-wins insert for match records. All
//! cross-worker coordination rests on those primitives; the scheduler never
//! holds a lock across them.

use crate::core::dirmon::{DirmonEntry, DirmonState, MatchKey, MatchRecord};
use crate::core::error::SchedulerError;
use crate::core::filter::JobQuery;
use crate::core::job::{JobRecord, JobVersion};
use crate::util::serde::{EntryId, JobId};

/// Storage for job records.
pub trait JobStore: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    ///
    /// Fails if a record with the same id exists or the backend errors.
    fn insert_job(&self, job: JobRecord) -> Result<(), SchedulerError>;

    /// Load a record by id.
    ///
    /// # Errors
    ///
    /// Backend failures only; a missing record is `Ok(None)`.
    fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, SchedulerError>;

    /// Records matching `query`, in claim order, capped at the query limit.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn find_jobs(&self, query: &JobQuery) -> Result<Vec<JobRecord>, SchedulerError>;

    /// Number of records matching `query`, ignoring its limit.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn count_jobs(&self, query: &JobQuery) -> Result<usize, SchedulerError>;

    /// Atomically apply `apply` to the record iff it is still at `expected`.
    ///
    /// Returns the updated record, or `None` when the record is missing or has
    /// moved on: a different state, claim or retry count.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn update_job_if(
        &self,
        id: JobId,
        expected: &JobVersion,
        apply: &(dyn Fn(&mut JobRecord) + Sync),
    ) -> Result<Option<JobRecord>, SchedulerError>;
}

/// Storage for directory-monitor entries.
pub trait DirmonStore: Send + Sync {
    /// Persist a new entry.
    ///
    /// # Errors
    ///
    /// Fails on duplicate id or backend error.
    fn insert_entry(&self, entry: DirmonEntry) -> Result<(), SchedulerError>;

    /// Load an entry by id.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn get_entry(&self, id: EntryId) -> Result<Option<DirmonEntry>, SchedulerError>;

    /// Entries in `state`, or all entries when `None`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn list_entries(&self, state: Option<DirmonState>) -> Result<Vec<DirmonEntry>, SchedulerError>;

    /// Atomically mutate an entry. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn update_entry(
        &self,
        id: EntryId,
        apply: &(dyn Fn(&mut DirmonEntry) + Sync),
    ) -> Result<Option<DirmonEntry>, SchedulerError>;
}

/// Storage for match records. The insert is the de-duplication point between
/// concurrent monitors.
pub trait MatchStore: Send + Sync {
    /// Insert unless the key is already present. Returns true if this call won.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn insert_match(&self, record: MatchRecord) -> Result<bool, SchedulerError>;

    /// True if the key has been recorded.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn contains_match(&self, key: &MatchKey) -> Result<bool, SchedulerError>;

    /// Release a key so a later scan may claim it again.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn remove_match(&self, key: &MatchKey) -> Result<bool, SchedulerError>;

    /// All matches recorded for an entry.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn matches_for(&self, entry_id: EntryId) -> Result<Vec<MatchRecord>, SchedulerError>;
}

/// A backend providing all three stores.
pub trait Store: JobStore + DirmonStore + MatchStore {}

impl<T> Store for T where T: JobStore + DirmonStore + MatchStore {}

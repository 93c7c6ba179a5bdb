//! Operator-facing surface: request/response models and the [`Operator`] handle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::core::{
    Arguments, DirmonEntry, DirmonState, DirmonStore, FailureDetail, JobQuery, JobRecord,
    JobState, NewJob, SchedulerError, StateMachine, ThrottleRegistry,
};
use crate::util::serde::{EntryId, JobId, Priority};

/// Job status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job identifier.
    pub job_id: JobId,
    /// Job type.
    pub job_type: String,
    /// Current state.
    pub state: JobState,
    /// Worker holding the job.
    pub claimed_by: Option<String>,
    /// Retries performed.
    pub attempts: u32,
    /// Handler result once completed.
    pub result: Option<Value>,
    /// Most recent failure.
    pub failure: Option<FailureDetail>,
}

impl From<&JobRecord> for JobStatusResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            state: job.state,
            claimed_by: job.claimed_by.clone(),
            attempts: job.attempts,
            result: job.result.clone(),
            failure: job.failure.clone(),
        }
    }
}

/// Partial update of a directory-monitor entry. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryEdit {
    /// New display name.
    pub name: Option<String>,
    /// New pattern.
    pub pattern: Option<String>,
    /// New job type.
    pub job_type: Option<String>,
    /// New perform-method.
    pub perform_method: Option<String>,
    /// New arguments.
    pub arguments: Option<Arguments>,
    /// New priority.
    pub priority: Option<Priority>,
}

impl EntryEdit {
    fn apply_to(&self, entry: &mut DirmonEntry) {
        if let Some(name) = &self.name {
            entry.name = Some(name.clone());
        }
        if let Some(pattern) = &self.pattern {
            entry.pattern.clone_from(pattern);
        }
        if let Some(job_type) = &self.job_type {
            entry.job_type.clone_from(job_type);
        }
        if let Some(method) = &self.perform_method {
            entry.perform_method.clone_from(method);
        }
        if let Some(arguments) = &self.arguments {
            entry.arguments = arguments.clone();
        }
        if let Some(priority) = self.priority {
            entry.priority = priority;
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Manual control over jobs, entries and throttles.
#[derive(Clone)]
pub struct Operator {
    machine: Arc<StateMachine>,
    throttles: Arc<ThrottleRegistry>,
    entries: Arc<dyn DirmonStore>,
}

impl Operator {
    /// Wire an operator to the shared components.
    pub fn new(
        machine: Arc<StateMachine>,
        throttles: Arc<ThrottleRegistry>,
        entries: Arc<dyn DirmonStore>,
    ) -> Self {
        Self {
            machine,
            throttles,
            entries,
        }
    }

    /// Validate and queue a job.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed submissions; backend errors.
    pub fn submit(&self, job: NewJob, now_ms: u128) -> Result<JobStatusResponse, SchedulerError> {
        self.machine.create(job, now_ms).map(|job| JobStatusResponse::from(&job))
    }

    /// Current status of a job.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub fn status(&self, id: JobId) -> Result<JobStatusResponse, SchedulerError> {
        self.machine
            .jobs()
            .get_job(id)?
            .map(|job| JobStatusResponse::from(&job))
            .ok_or_else(|| SchedulerError::NotFound(format!("job {id}")))
    }

    /// Jobs matching `query`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobStatusResponse>, SchedulerError> {
        Ok(self
            .machine
            .jobs()
            .find_jobs(query)?
            .iter()
            .map(JobStatusResponse::from)
            .collect())
    }

    /// running → paused.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` or `NotFound`.
    pub fn pause(&self, id: JobId, now_ms: u128) -> Result<JobStatusResponse, SchedulerError> {
        self.machine.pause(id, now_ms).map(|job| JobStatusResponse::from(&job))
    }

    /// paused → queued.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` or `NotFound`.
    pub fn resume(&self, id: JobId, now_ms: u128) -> Result<JobStatusResponse, SchedulerError> {
        self.machine.resume(id, now_ms).map(|job| JobStatusResponse::from(&job))
    }

    /// Non-terminal → aborted.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` or `NotFound`.
    pub fn abort(&self, id: JobId, now_ms: u128) -> Result<JobStatusResponse, SchedulerError> {
        self.machine.abort(id, now_ms).map(|job| JobStatusResponse::from(&job))
    }

    /// failed → queued.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` (including an exhausted attempt limit) or `NotFound`.
    pub fn retry(&self, id: JobId, now_ms: u128) -> Result<JobStatusResponse, SchedulerError> {
        self.machine.retry(id, now_ms).map(|job| JobStatusResponse::from(&job))
    }

    /// Validate and persist a new directory-monitor entry.
    ///
    /// # Errors
    ///
    /// `Validation` for bad entries; backend errors.
    pub fn create_entry(&self, entry: DirmonEntry) -> Result<DirmonEntry, SchedulerError> {
        entry.validate(self.machine.job_types())?;
        self.entries.insert_entry(entry.clone())?;
        info!(entry_id = %entry.id, pattern = %entry.pattern, job_type = %entry.job_type, "dirmon entry created");
        Ok(entry)
    }

    /// Load an entry.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub fn entry(&self, id: EntryId) -> Result<DirmonEntry, SchedulerError> {
        self.entries
            .get_entry(id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("dirmon entry {id}")))
    }

    /// Entries in `state`, or all.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn list_entries(&self, state: Option<DirmonState>) -> Result<Vec<DirmonEntry>, SchedulerError> {
        self.entries.list_entries(state)
    }

    /// Re-validate an entry and move it to `enabled`, clearing any failure.
    ///
    /// # Errors
    ///
    /// `Validation` if the entry no longer validates; `NotFound`.
    pub fn enable_entry(&self, id: EntryId) -> Result<DirmonEntry, SchedulerError> {
        self.entry(id)?.validate(self.machine.job_types())?;
        self.set_entry_state(id, DirmonState::Enabled)
    }

    /// Move an entry to `disabled`.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn disable_entry(&self, id: EntryId) -> Result<DirmonEntry, SchedulerError> {
        self.set_entry_state(id, DirmonState::Disabled)
    }

    /// Apply `edit` after validating the edited entry.
    ///
    /// # Errors
    ///
    /// `Validation` leaves the stored entry untouched; `NotFound`.
    pub fn edit_entry(&self, id: EntryId, edit: &EntryEdit) -> Result<DirmonEntry, SchedulerError> {
        let mut preview = self.entry(id)?;
        edit.apply_to(&mut preview);
        preview.validate(self.machine.job_types())?;
        self.entries
            .update_entry(id, &|entry: &mut DirmonEntry| edit.apply_to(entry))?
            .ok_or_else(|| SchedulerError::NotFound(format!("dirmon entry {id}")))
    }

    fn set_entry_state(&self, id: EntryId, state: DirmonState) -> Result<DirmonEntry, SchedulerError> {
        let updated = self
            .entries
            .update_entry(id, &|entry: &mut DirmonEntry| {
                entry.state = state;
                if state == DirmonState::Enabled {
                    entry.failure = None;
                }
            })?
            .ok_or_else(|| SchedulerError::NotFound(format!("dirmon entry {id}")))?;
        info!(entry_id = %id, state = %state, "dirmon entry state changed");
        Ok(updated)
    }

    /// Enable a registered throttle.
    ///
    /// # Errors
    ///
    /// `NotFound` if the throttle is not defined for the type.
    pub fn enable_throttle(&self, job_type: &str, name: &str) -> Result<(), SchedulerError> {
        self.throttles.enable(job_type, name)?;
        info!(job_type, throttle = name, "throttle enabled");
        Ok(())
    }

    /// Disable a registered throttle.
    ///
    /// # Errors
    ///
    /// `NotFound` if the throttle is not defined for the type.
    pub fn disable_throttle(&self, job_type: &str, name: &str) -> Result<(), SchedulerError> {
        self.throttles.disable(job_type, name)?;
        info!(job_type, throttle = name, "throttle disabled");
        Ok(())
    }

    /// Return a health payload.
    #[must_use]
    pub const fn health(&self) -> Health {
        Health { ok: true }
    }
}

//! Job records, lifecycle states and the template used to create them.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{SchedulerError, ValidationErrors};
use crate::core::handler::JobTypeRegistry;
use crate::util::serde::{JobId, Priority};

/// Entry point invoked when a job names no other perform-method.
pub const DEFAULT_PERFORM_METHOD: &str = "perform";

/// Lifecycle state of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed.
    Queued,
    /// Claimed by a worker and executing.
    Running,
    /// Suspended by an operator; holds no running slot.
    Paused,
    /// The handler errored or the job expired.
    Failed,
    /// Stopped by an operator. Terminal.
    Aborted,
    /// The handler returned normally. Terminal.
    Completed,
}

impl JobState {
    /// Lower-case name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Completed => "completed",
        }
    }

    /// States no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Completed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments passed to a perform-method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arguments {
    /// Ordered positional arguments.
    Positional(Vec<Value>),
    /// Named arguments.
    Keyed(Map<String, Value>),
}

impl Arguments {
    /// No arguments.
    #[must_use]
    pub const fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Number of arguments, compared against the handler's declared arity.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Keyed(map) => map.len(),
        }
    }

    /// True when no arguments are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positional argument at `index`, if this is a positional list.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Positional(values) => values.get(index),
            Self::Keyed(_) => None,
        }
    }

    /// Named argument, if this is a keyed mapping.
    #[must_use]
    pub fn named(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Positional(_) => None,
            Self::Keyed(map) => map.get(key),
        }
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self::Keyed(map)
    }
}

/// Why and where a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Error message reported by the handler or the scheduler.
    pub message: String,
    /// Worker that was running the job, if any.
    pub worker: Option<String>,
    /// When the failure was recorded.
    pub failed_at_ms: u128,
}

/// Durable record of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique id.
    pub id: JobId,
    /// Registered job type; selects the handler and its throttles.
    pub job_type: String,
    /// Lifecycle state.
    pub state: JobState,
    /// Lower is sooner.
    pub priority: Priority,
    /// Arguments for the perform-method.
    pub arguments: Arguments,
    /// Handler entry point.
    pub perform_method: String,
    /// Earliest time the job may be claimed.
    pub run_at_ms: u128,
    /// Jobs not claimed before this time are never claimed.
    pub expires_at_ms: Option<u128>,
    /// Worker holding the job. Set iff the job is running.
    pub claimed_by: Option<String>,
    /// When the current claim was taken.
    pub claimed_at_ms: Option<u128>,
    /// When the record was created.
    pub created_at_ms: u128,
    /// When the job reached `completed`, `failed` or `aborted`.
    pub completed_at_ms: Option<u128>,
    /// Value returned by the handler.
    pub result: Option<Value>,
    /// Most recent failure.
    pub failure: Option<FailureDetail>,
    /// Number of retries performed after failures.
    pub attempts: u32,
    /// Optional key narrowing the running-jobs throttle to a sub-group of the type.
    pub throttle_group: Option<String>,
    /// File that caused a directory monitor to spawn this job.
    pub source_path: Option<PathBuf>,
}

impl JobRecord {
    /// True when the claim invariant holds: `claimed_by` is set iff the job is running.
    #[must_use]
    pub fn claim_invariant_holds(&self) -> bool {
        self.claimed_by.is_some() == (self.state == JobState::Running)
    }

    /// True once `now_ms` has reached the expiry time.
    #[must_use]
    pub fn is_expired(&self, now_ms: u128) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    /// True when the job may be claimed at `now_ms`.
    #[must_use]
    pub fn is_runnable(&self, now_ms: u128) -> bool {
        self.state == JobState::Queued && self.run_at_ms <= now_ms && !self.is_expired(now_ms)
    }

    /// Sort key used by the claim scheduler: priority, then run_at, then id.
    #[must_use]
    pub fn rank(&self) -> (Priority, u128, JobId) {
        (self.priority, self.run_at_ms, self.id)
    }

    /// Fields a conditional update compares before applying a change.
    #[must_use]
    pub fn version(&self) -> JobVersion {
        JobVersion {
            state: self.state,
            claimed_by: self.claimed_by.clone(),
            claimed_at_ms: self.claimed_at_ms,
            attempts: self.attempts,
        }
    }
}

/// Snapshot of the fields that change on every lifecycle transition.
///
/// Two records with equal versions are in the same state under the same claim
/// and retry count, so a transition computed against one is valid for the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobVersion {
    /// Lifecycle state.
    pub state: JobState,
    /// Worker holding the job.
    pub claimed_by: Option<String>,
    /// When the claim was taken.
    pub claimed_at_ms: Option<u128>,
    /// Retry count.
    pub attempts: u32,
}

impl JobVersion {
    /// True when `job` is still at this version.
    #[must_use]
    pub fn matches(&self, job: &JobRecord) -> bool {
        self.state == job.state
            && self.claimed_by == job.claimed_by
            && self.claimed_at_ms == job.claimed_at_ms
            && self.attempts == job.attempts
    }
}

/// Template for a job that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    /// Job type to instantiate.
    pub job_type: String,
    /// Entry point; `perform` when omitted.
    #[serde(default = "default_perform_method")]
    pub perform_method: String,
    /// Arguments for the entry point.
    #[serde(default)]
    pub arguments: Arguments,
    /// Lower is sooner.
    #[serde(default)]
    pub priority: Priority,
    /// Earliest claim time; creation time when omitted.
    #[serde(default)]
    pub run_at_ms: Option<u128>,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at_ms: Option<u128>,
    /// Optional running-jobs throttle group.
    #[serde(default)]
    pub throttle_group: Option<String>,
    /// File that produced the job.
    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

fn default_perform_method() -> String {
    DEFAULT_PERFORM_METHOD.to_string()
}

impl NewJob {
    /// Start a template for `job_type` with default settings.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            perform_method: default_perform_method(),
            arguments: Arguments::none(),
            priority: Priority::default(),
            run_at_ms: None,
            expires_at_ms: None,
            throttle_group: None,
            source_path: None,
        }
    }

    /// Set the perform-method.
    #[must_use]
    pub fn with_perform_method(mut self, method: impl Into<String>) -> Self {
        self.perform_method = method.into();
        self
    }

    /// Set the arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<Arguments>) -> Self {
        self.arguments = arguments.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Priority(priority);
        self
    }

    /// Delay the job until `run_at_ms`.
    #[must_use]
    pub fn with_run_at(mut self, run_at_ms: u128) -> Self {
        self.run_at_ms = Some(run_at_ms);
        self
    }

    /// Expire the job at `expires_at_ms`.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at_ms: u128) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    /// Narrow the running-jobs throttle to `group`.
    #[must_use]
    pub fn with_throttle_group(mut self, group: impl Into<String>) -> Self {
        self.throttle_group = Some(group.into());
        self
    }

    /// Record the file that produced the job.
    #[must_use]
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Check the template against the live job type registry.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Validation` naming every problem found.
    pub fn validate(&self, job_types: &JobTypeRegistry) -> Result<(), SchedulerError> {
        let mut errors = ValidationErrors::new();
        if self.job_type.trim().is_empty() {
            errors.add("job_type", "can't be blank");
        }
        job_types.check_arguments(
            &self.job_type,
            &self.perform_method,
            &self.arguments,
            &mut errors,
        );
        if let (Some(run_at), Some(expires_at)) = (self.run_at_ms, self.expires_at_ms) {
            if expires_at < run_at {
                errors.add("expires_at", "must not be earlier than run_at");
            }
        }
        errors.into_result()
    }

    /// Validate and produce a `queued` record.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Validation` when the template is malformed.
    pub fn build(self, job_types: &JobTypeRegistry, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.validate(job_types)?;
        Ok(JobRecord {
            id: JobId::new(),
            job_type: self.job_type,
            state: JobState::Queued,
            priority: self.priority,
            arguments: self.arguments,
            perform_method: self.perform_method,
            run_at_ms: self.run_at_ms.unwrap_or(now_ms),
            expires_at_ms: self.expires_at_ms,
            claimed_by: None,
            claimed_at_ms: None,
            created_at_ms: now_ms,
            completed_at_ms: None,
            result: None,
            failure: None,
            attempts: 0,
            throttle_group: self.throttle_group,
            source_path: self.source_path,
        })
    }
}

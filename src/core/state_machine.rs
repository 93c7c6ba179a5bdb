//! Job lifecycle state machine.
//!
//! ```text
//!            claim               complete
//!  queued ─────────▶ running ─────────────▶ completed
//!    ▲  ▲             │  │ fail / expire
//!    │  │   resume    │  └──────────────▶ failed ──┐
//!    │  └── paused ◀──┘ pause                       │ retry (bounded)
//!    └──────────────────────────────────────────────┘
//!
//!  queued | running | paused | failed ── abort ──▶ aborted
//! ```
//!
//! Every transition is one conditional update keyed on the state the caller
//! observed. If another process moved the record first, the update matches
//! nothing and the caller gets `IllegalTransition`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::error::{SchedulerError, ValidationErrors};
use crate::core::handler::JobTypeRegistry;
use crate::core::job::{FailureDetail, JobRecord, JobState, NewJob};
use crate::core::store::JobStore;
use crate::util::serde::JobId;

/// Requested lifecycle change.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// queued → running. Only issued by the claim scheduler.
    Start {
        /// Claiming worker.
        worker: String,
    },
    /// running → completed.
    Complete {
        /// Value returned by the handler.
        result: Value,
    },
    /// running → failed.
    Fail {
        /// Handler error or expiry reason.
        message: String,
    },
    /// running → paused.
    Pause,
    /// paused → queued.
    Resume,
    /// queued | running | paused | failed → aborted.
    Abort,
    /// failed → queued, bounded by the attempt limit.
    Retry,
}

impl JobEvent {
    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Abort => "abort",
            Self::Retry => "retry",
        }
    }

    /// True if the event may fire from `state`.
    #[must_use]
    pub const fn allowed_from(&self, state: JobState) -> bool {
        match self {
            Self::Start { .. } => matches!(state, JobState::Queued),
            Self::Complete { .. } | Self::Fail { .. } | Self::Pause => {
                matches!(state, JobState::Running)
            }
            Self::Resume => matches!(state, JobState::Paused),
            Self::Abort => matches!(
                state,
                JobState::Queued | JobState::Running | JobState::Paused | JobState::Failed
            ),
            Self::Retry => matches!(state, JobState::Failed),
        }
    }

    /// State the record ends in.
    #[must_use]
    pub const fn target(&self) -> JobState {
        match self {
            Self::Start { .. } => JobState::Running,
            Self::Complete { .. } => JobState::Completed,
            Self::Fail { .. } => JobState::Failed,
            Self::Pause => JobState::Paused,
            Self::Resume | Self::Retry => JobState::Queued,
            Self::Abort => JobState::Aborted,
        }
    }
}

/// What a retried job keeps from its original schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Keep the original priority and run_at; the job re-enters at its old rank.
    #[default]
    PreserveSchedule,
    /// Keep the priority but move run_at to the retry time.
    Reschedule,
}

/// Observer of lifecycle changes.
pub trait TransitionHook: Send + Sync {
    /// Called before the conditional update. Returning an error vetoes the transition.
    ///
    /// # Errors
    ///
    /// Any error aborts the transition and is returned to the caller.
    fn before(&self, _job: &JobRecord, _event: &JobEvent) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Called after a successful update with the new record.
    fn after(&self, _job: &JobRecord, _from: JobState, _event: &JobEvent) {}

    /// Called after a new job is persisted in `queued`.
    fn after_create(&self, _job: &JobRecord) {}
}

/// Enforces legal transitions on job records.
#[derive(Clone)]
pub struct StateMachine {
    jobs: Arc<dyn JobStore>,
    job_types: Arc<JobTypeRegistry>,
    hooks: Vec<Arc<dyn TransitionHook>>,
    max_attempts: u32,
    retry_policy: RetryPolicy,
}

impl StateMachine {
    /// Create an engine over `jobs`. Retries are bounded by `max_attempts`.
    pub fn new(jobs: Arc<dyn JobStore>, job_types: Arc<JobTypeRegistry>, max_attempts: u32) -> Self {
        Self {
            jobs,
            job_types,
            hooks: Vec::new(),
            max_attempts,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Attach a hook. Hooks run in attachment order.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Choose the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Store the engine writes to.
    #[must_use]
    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Registry used for validation.
    #[must_use]
    pub fn job_types(&self) -> &Arc<JobTypeRegistry> {
        &self.job_types
    }

    /// Configured retry limit.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Validate `new_job` and persist it as `queued`.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed templates; backend errors from the store.
    pub fn create(&self, new_job: NewJob, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        let job = new_job.build(&self.job_types, now_ms)?;
        self.enqueue(job)
    }

    /// Persist a record built elsewhere. It must be `queued` and unclaimed.
    ///
    /// # Errors
    ///
    /// `Validation` for records in any other shape; backend errors from the store.
    pub fn enqueue(&self, job: JobRecord) -> Result<JobRecord, SchedulerError> {
        let mut errors = ValidationErrors::new();
        if job.state != JobState::Queued {
            errors.add("state", format!("new jobs must be queued, not {}", job.state));
        }
        if job.claimed_by.is_some() {
            errors.add("claimed_by", "must be blank for a queued job");
        }
        errors.into_result()?;
        self.jobs.insert_job(job.clone())?;
        info!(job_id = %job.id, job_type = %job.job_type, "job queued");
        for hook in &self.hooks {
            hook.after_create(&job);
        }
        Ok(job)
    }

    /// queued → running for a candidate the caller already fetched.
    pub(crate) fn start(
        &self,
        candidate: &JobRecord,
        worker: &str,
        now_ms: u128,
    ) -> Result<JobRecord, SchedulerError> {
        self.transition(
            candidate,
            &JobEvent::Start {
                worker: worker.to_string(),
            },
            now_ms,
        )
    }

    /// running → completed, for the claim recorded in `claimed`.
    ///
    /// `claimed` is the record returned when the job was started. If the job
    /// has since been paused, re-claimed or otherwise moved on, the stale claim
    /// is rejected and the current holder keeps the job.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` unless the job is still running under that claim.
    pub fn complete(&self, claimed: &JobRecord, result: Value, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.transition(claimed, &JobEvent::Complete { result }, now_ms)
    }

    /// running → failed with `message` as the failure detail, for the claim
    /// recorded in `claimed`.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` unless the job is still running under that claim.
    pub fn fail(
        &self,
        claimed: &JobRecord,
        message: impl Into<String>,
        now_ms: u128,
    ) -> Result<JobRecord, SchedulerError> {
        self.transition(
            claimed,
            &JobEvent::Fail {
                message: message.into(),
            },
            now_ms,
        )
    }

    /// running → failed because the expiry time passed.
    ///
    /// # Errors
    ///
    /// As for [`StateMachine::fail`].
    pub fn expire(&self, claimed: &JobRecord, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.fail(claimed, "job expired before it could run", now_ms)
    }

    /// running → paused.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` unless the job is running.
    pub fn pause(&self, id: JobId, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.apply(id, &JobEvent::Pause, now_ms)
    }

    /// paused → queued.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` unless the job is paused.
    pub fn resume(&self, id: JobId, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.apply(id, &JobEvent::Resume, now_ms)
    }

    /// Any non-terminal state → aborted.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` for completed or aborted jobs.
    pub fn abort(&self, id: JobId, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.apply(id, &JobEvent::Abort, now_ms)
    }

    /// failed → queued, incrementing the attempt counter.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` unless the job is failed and below the attempt limit.
    pub fn retry(&self, id: JobId, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        self.apply(id, &JobEvent::Retry, now_ms)
    }

    /// Load the record and apply `event` to it.
    ///
    /// # Errors
    ///
    /// `NotFound`, `IllegalTransition`, hook vetoes, or backend errors.
    pub fn apply(&self, id: JobId, event: &JobEvent, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        let current = self
            .jobs
            .get_job(id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("job {id}")))?;
        self.transition(&current, event, now_ms)
    }

    fn transition(
        &self,
        current: &JobRecord,
        event: &JobEvent,
        now_ms: u128,
    ) -> Result<JobRecord, SchedulerError> {
        let illegal = |from: JobState| SchedulerError::IllegalTransition {
            job_id: current.id,
            from,
            event: event.name(),
        };

        if !event.allowed_from(current.state) {
            return Err(illegal(current.state));
        }
        if matches!(event, JobEvent::Retry) && current.attempts >= self.max_attempts {
            warn!(
                job_id = %current.id,
                attempts = current.attempts,
                max_attempts = self.max_attempts,
                "retry limit reached; job stays failed"
            );
            return Err(illegal(current.state));
        }
        for hook in &self.hooks {
            hook.before(current, event)?;
        }

        let policy = self.retry_policy;
        let apply = |job: &mut JobRecord| apply_event(job, event, policy, now_ms);
        let Some(updated) = self.jobs.update_job_if(current.id, &current.version(), &apply)? else {
            // Someone else moved the record first.
            let observed = self
                .jobs
                .get_job(current.id)?
                .map_or(current.state, |job| job.state);
            debug!(job_id = %current.id, event = event.name(), observed = %observed, "stale transition");
            return Err(illegal(observed));
        };

        debug!(
            job_id = %updated.id,
            job_type = %updated.job_type,
            from = %current.state,
            to = %updated.state,
            "job transitioned"
        );
        for hook in &self.hooks {
            hook.after(&updated, current.state, event);
        }
        Ok(updated)
    }
}

fn apply_event(job: &mut JobRecord, event: &JobEvent, policy: RetryPolicy, now_ms: u128) {
    job.state = event.target();
    match event {
        JobEvent::Start { worker } => {
            job.claimed_by = Some(worker.clone());
            job.claimed_at_ms = Some(now_ms);
        }
        JobEvent::Complete { result } => {
            job.claimed_by = None;
            job.result = Some(result.clone());
            job.completed_at_ms = Some(now_ms);
        }
        JobEvent::Fail { message } => {
            job.failure = Some(FailureDetail {
                message: message.clone(),
                worker: job.claimed_by.take(),
                failed_at_ms: now_ms,
            });
            job.completed_at_ms = Some(now_ms);
        }
        JobEvent::Pause => {
            job.claimed_by = None;
            job.claimed_at_ms = None;
        }
        JobEvent::Resume => {}
        JobEvent::Abort => {
            job.claimed_by = None;
            job.completed_at_ms = Some(now_ms);
        }
        JobEvent::Retry => {
            job.attempts += 1;
            job.completed_at_ms = None;
            job.claimed_at_ms = None;
            if policy == RetryPolicy::Reschedule {
                job.run_at_ms = now_ms;
            }
        }
    }
}

//! Claim scheduler: lock-free "take the next runnable job".
//!
//! A pass repeatedly fetches the best queued candidate that the exclusion
//! filter has not ruled out, asks the throttle evaluator whether it may run,
//! and tries the conditional queued → running update. Throttled candidates
//! and lost races both fold a hint into the filter, so the next query skips
//! them; the pass ends with a claimed job or an empty query.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::error::SchedulerError;
use crate::core::filter::{ExclusionFilter, ExclusionHint, JobQuery};
use crate::core::job::JobRecord;
use crate::core::state_machine::StateMachine;
use crate::core::throttle::{ThrottleDecision, ThrottleEvaluator};
use crate::util::serde::JobId;

/// Finds and atomically claims jobs on behalf of workers.
#[derive(Clone)]
pub struct ClaimScheduler {
    machine: Arc<StateMachine>,
    throttles: ThrottleEvaluator,
}

impl ClaimScheduler {
    /// Claim through `machine`, gating candidates with `throttles`.
    pub fn new(machine: Arc<StateMachine>, throttles: ThrottleEvaluator) -> Self {
        Self { machine, throttles }
    }

    /// Lifecycle engine used for claims.
    #[must_use]
    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    /// Claim the next eligible job for `worker`, or `None` if nothing is runnable.
    ///
    /// `filter` is extended with every exclusion made during the pass, so a
    /// caller may reuse it to avoid re-fetching rejected types.
    ///
    /// # Errors
    ///
    /// Backend errors from the store. Lost races are never surfaced.
    pub fn claim_next(
        &self,
        worker: &str,
        filter: &mut ExclusionFilter,
        now_ms: u128,
    ) -> Result<Option<JobRecord>, SchedulerError> {
        let jobs = self.machine.jobs();
        let mut rounds = 0_usize;
        loop {
            rounds += 1;
            let query = JobQuery::runnable(now_ms, filter).limit(1);
            let Some(candidate) = jobs.find_jobs(&query)?.into_iter().next() else {
                trace!(worker, rounds, excluded = filter.len(), "no runnable job");
                return Ok(None);
            };

            match self.throttles.evaluate(&candidate, worker) {
                ThrottleDecision::Reject { throttle, hint } => {
                    debug!(
                        worker,
                        job_id = %candidate.id,
                        job_type = %candidate.job_type,
                        throttle = %throttle,
                        "candidate throttled"
                    );
                    Self::exclude(filter, hint, candidate.id);
                }
                ThrottleDecision::Accept => match self.machine.start(&candidate, worker, now_ms) {
                    Ok(job) => {
                        debug!(worker, job_id = %job.id, job_type = %job.job_type, rounds, "job claimed");
                        return Ok(Some(job));
                    }
                    Err(e) if e.is_illegal_transition() => {
                        debug!(worker, job_id = %candidate.id, "lost claim race");
                        filter.merge(ExclusionHint::JobId(candidate.id));
                    }
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// Claim the next eligible job with a fresh filter.
    ///
    /// # Errors
    ///
    /// See [`ClaimScheduler::claim_next`].
    pub fn claim_any(&self, worker: &str, now_ms: u128) -> Result<Option<JobRecord>, SchedulerError> {
        self.claim_next(worker, &mut ExclusionFilter::new(), now_ms)
    }

    /// Claim one specific job through the same throttle and conditional-update path.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; `IllegalTransition` if the job is not
    /// runnable, a throttle rejects it, or another worker claimed it first.
    pub fn try_claim(&self, id: JobId, worker: &str, now_ms: u128) -> Result<JobRecord, SchedulerError> {
        let candidate = self
            .machine
            .jobs()
            .get_job(id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("job {id}")))?;
        let illegal = || SchedulerError::IllegalTransition {
            job_id: id,
            from: candidate.state,
            event: "start",
        };
        if !candidate.is_runnable(now_ms) {
            return Err(illegal());
        }
        if !self.throttles.evaluate(&candidate, worker).is_accept() {
            return Err(illegal());
        }
        self.machine.start(&candidate, worker, now_ms)
    }

    fn exclude(filter: &mut ExclusionFilter, hint: ExclusionHint, id: JobId) {
        // A hint that adds nothing would re-fetch the same candidate forever.
        if !filter.merge(hint) {
            filter.merge(ExclusionHint::JobId(id));
        }
    }
}

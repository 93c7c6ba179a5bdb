//! Candidate queries and the exclusion filter folded across a claim pass.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::job::{JobRecord, JobState};
use crate::util::serde::JobId;

/// Filter fragment contributed by a rejected candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionHint {
    /// Skip every job of this type for the rest of the pass.
    JobType(String),
    /// Skip jobs of this type that share a throttle group.
    Group {
        /// Job type.
        job_type: String,
        /// Throttle group.
        group: String,
    },
    /// Skip jobs of this type that carry no throttle group.
    Ungrouped(String),
    /// Skip one job.
    JobId(JobId),
}

/// Negative filter accumulated while a claim pass rejects candidates.
///
/// Callers may keep a filter across several `claim_next` calls to carry the
/// exclusions forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionFilter {
    job_types: BTreeSet<String>,
    groups: BTreeSet<(String, String)>,
    ungrouped: BTreeSet<String>,
    job_ids: BTreeSet<JobId>,
}

impl ExclusionFilter {
    /// Empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a hint into the filter. Returns false if it was already present.
    pub fn merge(&mut self, hint: ExclusionHint) -> bool {
        match hint {
            ExclusionHint::JobType(job_type) => self.job_types.insert(job_type),
            ExclusionHint::Group { job_type, group } => self.groups.insert((job_type, group)),
            ExclusionHint::Ungrouped(job_type) => self.ungrouped.insert(job_type),
            ExclusionHint::JobId(id) => self.job_ids.insert(id),
        }
    }

    /// True if `job` is filtered out.
    #[must_use]
    pub fn excludes(&self, job: &JobRecord) -> bool {
        if self.job_ids.contains(&job.id) || self.job_types.contains(&job.job_type) {
            return true;
        }
        match &job.throttle_group {
            Some(group) => self
                .groups
                .iter()
                .any(|(job_type, excluded)| job_type == &job.job_type && excluded == group),
            None => self.ungrouped.contains(&job.job_type),
        }
    }

    /// Number of exclusion clauses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.job_types.len() + self.groups.len() + self.ungrouped.len() + self.job_ids.len()
    }

    /// True when nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Excluded job types.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.job_types.iter().map(String::as_str)
    }

    /// Excluded job ids.
    pub fn job_ids(&self) -> impl Iterator<Item = &JobId> {
        self.job_ids.iter()
    }
}

/// Filter, sort and limit applied by a job store.
///
/// Results are always ordered by `(priority asc, run_at asc, id asc)`.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Accept only these states; empty accepts all.
    pub states: Vec<JobState>,
    /// Accept only this job type.
    pub job_type: Option<String>,
    /// Accept only this throttle group.
    pub throttle_group: Option<String>,
    /// Accept only jobs without a throttle group.
    pub ungrouped: bool,
    /// Accept only jobs runnable at this time (run_at reached, not expired).
    pub runnable_at_ms: Option<u128>,
    /// Reject anything the filter excludes.
    pub exclude: ExclusionFilter,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

impl JobQuery {
    /// Query matching every job.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued jobs runnable at `now_ms`, best first, excluding `filter`.
    #[must_use]
    pub fn runnable(now_ms: u128, filter: &ExclusionFilter) -> Self {
        Self {
            states: vec![JobState::Queued],
            runnable_at_ms: Some(now_ms),
            exclude: filter.clone(),
            ..Self::default()
        }
    }

    /// Restrict to `state`.
    #[must_use]
    pub fn in_state(mut self, state: JobState) -> Self {
        self.states.push(state);
        self
    }

    /// Restrict to `job_type`.
    #[must_use]
    pub fn of_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    /// Restrict to a throttle group.
    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.throttle_group = Some(group.into());
        self
    }

    /// Restrict to jobs that carry no throttle group.
    #[must_use]
    pub fn without_group(mut self) -> Self {
        self.ungrouped = true;
        self
    }

    /// Cap the result count.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if `job` satisfies every clause except the limit.
    #[must_use]
    pub fn matches(&self, job: &JobRecord) -> bool {
        if !self.states.is_empty() && !self.states.contains(&job.state) {
            return false;
        }
        if self.job_type.as_ref().is_some_and(|t| t != &job.job_type) {
            return false;
        }
        if self.throttle_group.is_some() && self.throttle_group != job.throttle_group {
            return false;
        }
        if self.ungrouped && job.throttle_group.is_some() {
            return false;
        }
        if let Some(now) = self.runnable_at_ms {
            if job.run_at_ms > now || job.is_expired(now) {
                return false;
            }
        }
        !self.exclude.excludes(job)
    }

    /// Sort `jobs` into claim order and apply the limit.
    pub fn order_and_limit(&self, jobs: &mut Vec<JobRecord>) {
        jobs.sort_by_key(JobRecord::rank);
        if let Some(limit) = self.limit {
            jobs.truncate(limit);
        }
    }
}

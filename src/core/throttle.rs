//! Throttle registry and evaluator.
//!
//! Each job type owns an ordered list of named throttles. A throttle reports
//! whether running a candidate job right now would exceed some limit; the
//! evaluator walks the enabled throttles of the candidate's type and stops at
//! the first one that reports exceeded. Enabled flags live in the registry and
//! are shared by every job of the type, so toggling one takes effect on the
//! next evaluation anywhere in the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::core::error::{AppResult, SchedulerError};
use crate::core::filter::{ExclusionHint, JobQuery};
use crate::core::job::{JobRecord, JobState};
use crate::core::store::JobStore;

/// Inputs available to a throttle predicate.
pub struct ThrottleContext<'a> {
    /// Candidate job.
    pub job: &'a JobRecord,
    /// Worker asking to run it.
    pub worker: &'a str,
    /// Live view of the job store.
    pub jobs: &'a dyn JobStore,
}

/// A named predicate bounding execution of a job type.
///
/// Implementations are evaluated concurrently by many workers and must not
/// require exclusive access to anything.
pub trait Throttle: Send + Sync {
    /// Name, unique per job type.
    fn name(&self) -> &str;

    /// True when running `ctx.job` now would exceed the limit.
    ///
    /// # Errors
    ///
    /// Any error is treated as "exceeded" by the evaluator.
    fn exceeded(&self, ctx: &ThrottleContext<'_>) -> AppResult<bool>;

    /// Filter fragment to skip similar candidates for the rest of the pass.
    /// `None` excludes only the rejected job.
    fn exclusion_hint(&self, _job: &JobRecord) -> Option<ExclusionHint> {
        None
    }
}

/// Canonical throttle: at most `max_running` jobs of a type running at once.
///
/// Paused and failed jobs hold no slot. With `per_group` set, the count is
/// narrowed to jobs sharing the candidate's throttle group; jobs without a
/// group share one bucket of their own.
#[derive(Debug, Clone)]
pub struct RunningJobsLimit {
    max_running: usize,
    per_group: bool,
}

impl RunningJobsLimit {
    /// Name under which the throttle is registered.
    pub const NAME: &'static str = "running_jobs_limit";

    /// Limit the whole job type.
    #[must_use]
    pub const fn new(max_running: usize) -> Self {
        Self {
            max_running,
            per_group: false,
        }
    }

    /// Limit each throttle group separately.
    #[must_use]
    pub const fn per_group(max_running: usize) -> Self {
        Self {
            max_running,
            per_group: true,
        }
    }

    /// Configured maximum.
    #[must_use]
    pub const fn max_running(&self) -> usize {
        self.max_running
    }

    fn query_for(&self, job: &JobRecord) -> JobQuery {
        let query = JobQuery::new()
            .in_state(JobState::Running)
            .of_type(job.job_type.clone());
        match (self.per_group, &job.throttle_group) {
            (false, _) => query,
            (true, Some(group)) => query.in_group(group.clone()),
            (true, None) => query.without_group(),
        }
    }
}

impl Throttle for RunningJobsLimit {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn exceeded(&self, ctx: &ThrottleContext<'_>) -> AppResult<bool> {
        let running = ctx.jobs.count_jobs(&self.query_for(ctx.job))?;
        Ok(running >= self.max_running)
    }

    fn exclusion_hint(&self, job: &JobRecord) -> Option<ExclusionHint> {
        let job_type = job.job_type.clone();
        Some(match (self.per_group, &job.throttle_group) {
            (false, _) => ExclusionHint::JobType(job_type),
            (true, Some(group)) => ExclusionHint::Group {
                job_type,
                group: group.clone(),
            },
            (true, None) => ExclusionHint::Ungrouped(job_type),
        })
    }
}

type PredicateFn = dyn Fn(&ThrottleContext<'_>) -> AppResult<bool> + Send + Sync;
type HintFn = dyn Fn(&JobRecord) -> Option<ExclusionHint> + Send + Sync;

/// Throttle backed by closures.
pub struct FnThrottle {
    name: String,
    predicate: Box<PredicateFn>,
    hint: Option<Box<HintFn>>,
}

impl FnThrottle {
    /// Wrap `predicate` under `name`.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ThrottleContext<'_>) -> AppResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            hint: None,
        }
    }

    /// Attach an exclusion-hint generator.
    #[must_use]
    pub fn with_hint<H>(mut self, hint: H) -> Self
    where
        H: Fn(&JobRecord) -> Option<ExclusionHint> + Send + Sync + 'static,
    {
        self.hint = Some(Box::new(hint));
        self
    }
}

impl Throttle for FnThrottle {
    fn name(&self) -> &str {
        &self.name
    }

    fn exceeded(&self, ctx: &ThrottleContext<'_>) -> AppResult<bool> {
        (self.predicate)(ctx)
    }

    fn exclusion_hint(&self, job: &JobRecord) -> Option<ExclusionHint> {
        self.hint.as_ref().and_then(|hint| hint(job))
    }
}

impl fmt::Debug for FnThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnThrottle").field("name", &self.name).finish()
    }
}

struct Registered {
    throttle: Arc<dyn Throttle>,
    enabled: Arc<AtomicBool>,
}

/// Per job type, ordered throttle definitions with runtime enable flags.
#[derive(Default)]
pub struct ThrottleRegistry {
    by_type: RwLock<HashMap<String, Vec<Registered>>>,
}

impl ThrottleRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `throttle` to `job_type`, enabled. Redefining a name replaces it in place.
    pub fn define(&self, job_type: &str, throttle: Arc<dyn Throttle>) {
        let mut by_type = self.by_type.write();
        let list = by_type.entry(job_type.to_string()).or_default();
        let registered = Registered {
            throttle,
            enabled: Arc::new(AtomicBool::new(true)),
        };
        if let Some(slot) = list
            .iter_mut()
            .find(|r| r.throttle.name() == registered.throttle.name())
        {
            *slot = registered;
        } else {
            list.push(registered);
        }
    }

    /// Remove a throttle. Returns false if it was not defined.
    pub fn undefine(&self, job_type: &str, name: &str) -> bool {
        let mut by_type = self.by_type.write();
        let Some(list) = by_type.get_mut(job_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.throttle.name() != name);
        before != list.len()
    }

    /// True if `name` is defined on `job_type`.
    #[must_use]
    pub fn is_defined(&self, job_type: &str, name: &str) -> bool {
        self.flag(job_type, name).is_some()
    }

    /// Names defined on `job_type`, in evaluation order.
    #[must_use]
    pub fn names(&self, job_type: &str) -> Vec<String> {
        self.by_type
            .read()
            .get(job_type)
            .map(|list| list.iter().map(|r| r.throttle.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Enable a throttle for every job of the type.
    ///
    /// # Errors
    ///
    /// `SchedulerError::NotFound` if the throttle is not defined.
    pub fn enable(&self, job_type: &str, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(job_type, name, true)
    }

    /// Disable a throttle for every job of the type.
    ///
    /// # Errors
    ///
    /// `SchedulerError::NotFound` if the throttle is not defined.
    pub fn disable(&self, job_type: &str, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(job_type, name, false)
    }

    /// Current flag, or `None` if the throttle is not defined.
    #[must_use]
    pub fn is_enabled(&self, job_type: &str, name: &str) -> Option<bool> {
        self.flag(job_type, name)
            .map(|flag| flag.load(Ordering::Acquire))
    }

    /// Enabled throttles for `job_type`, in order.
    #[must_use]
    pub fn active(&self, job_type: &str) -> Vec<Arc<dyn Throttle>> {
        self.by_type
            .read()
            .get(job_type)
            .map(|list| {
                list.iter()
                    .filter(|r| r.enabled.load(Ordering::Acquire))
                    .map(|r| Arc::clone(&r.throttle))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn flag(&self, job_type: &str, name: &str) -> Option<Arc<AtomicBool>> {
        self.by_type.read().get(job_type).and_then(|list| {
            list.iter()
                .find(|r| r.throttle.name() == name)
                .map(|r| Arc::clone(&r.enabled))
        })
    }

    fn set_enabled(&self, job_type: &str, name: &str, enabled: bool) -> Result<(), SchedulerError> {
        let flag = self
            .flag(job_type, name)
            .ok_or_else(|| SchedulerError::NotFound(format!("throttle `{name}` on `{job_type}`")))?;
        flag.store(enabled, Ordering::Release);
        debug!(job_type, throttle = name, enabled, "throttle toggled");
        Ok(())
    }
}

impl fmt::Debug for ThrottleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let by_type = self.by_type.read();
        let mut map = f.debug_map();
        for (job_type, list) in by_type.iter() {
            let names: Vec<&str> = list.iter().map(|r| r.throttle.name()).collect();
            map.entry(job_type, &names);
        }
        map.finish()
    }
}

/// Outcome of evaluating a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// No throttle exceeded.
    Accept,
    /// A throttle exceeded (or errored).
    Reject {
        /// Throttle that rejected the candidate.
        throttle: String,
        /// Filter fragment for the next query.
        hint: ExclusionHint,
    },
}

impl ThrottleDecision {
    /// True for `Accept`.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Runs the registry against a job/worker pair.
#[derive(Clone)]
pub struct ThrottleEvaluator {
    registry: Arc<ThrottleRegistry>,
    jobs: Arc<dyn JobStore>,
}

impl ThrottleEvaluator {
    /// Evaluate throttles from `registry` against `jobs`.
    pub fn new(registry: Arc<ThrottleRegistry>, jobs: Arc<dyn JobStore>) -> Self {
        Self { registry, jobs }
    }

    /// Registry consulted by this evaluator.
    #[must_use]
    pub fn registry(&self) -> &Arc<ThrottleRegistry> {
        &self.registry
    }

    /// Check every enabled throttle of the job's type, stopping at the first exceeded.
    ///
    /// A throttle that errors is treated as exceeded for this candidate only.
    #[must_use]
    pub fn evaluate(&self, job: &JobRecord, worker: &str) -> ThrottleDecision {
        let ctx = ThrottleContext {
            job,
            worker,
            jobs: self.jobs.as_ref(),
        };
        for throttle in self.registry.active(&job.job_type) {
            match throttle.exceeded(&ctx) {
                Ok(false) => {}
                Ok(true) => {
                    let hint = throttle
                        .exclusion_hint(job)
                        .unwrap_or(ExclusionHint::JobId(job.id));
                    debug!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        throttle = throttle.name(),
                        "throttle exceeded"
                    );
                    return ThrottleDecision::Reject {
                        throttle: throttle.name().to_string(),
                        hint,
                    };
                }
                Err(e) => {
                    let err = SchedulerError::ThrottleMisconfiguration {
                        throttle: throttle.name().to_string(),
                        reason: format!("{e:#}"),
                    };
                    warn!(job_id = %job.id, job_type = %job.job_type, error = %err, "treating throttle as exceeded");
                    return ThrottleDecision::Reject {
                        throttle: throttle.name().to_string(),
                        hint: ExclusionHint::JobId(job.id),
                    };
                }
            }
        }
        ThrottleDecision::Accept
    }
}

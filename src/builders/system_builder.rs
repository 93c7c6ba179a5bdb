//! Builder assembling a complete job system from configuration.

use std::sync::Arc;
#[cfg(feature = "tokio-runtime")]
use std::time::Duration;

use tracing::info;

use crate::config::SchedulerConfig;
use crate::core::{
    AuditHook, ClaimScheduler, DirectoryMonitor, DirmonStore, FileSystem, JobStore,
    JobTypeRegistry, MatchStore, RunningJobsLimit, SchedulerError, StateMachine, Store,
    ThrottleEvaluator, ThrottleRegistry, TracingAuditSink, TransitionHook,
};
use crate::runtime::api::Operator;
#[cfg(feature = "tokio-runtime")]
use crate::runtime::ticker::DirmonTicker;

/// Every component of a running system, sharing one store.
#[derive(Clone)]
pub struct JobSystem {
    /// Configuration the system was built from.
    pub config: SchedulerConfig,
    /// Registered job types.
    pub job_types: Arc<JobTypeRegistry>,
    /// Lifecycle engine.
    pub machine: Arc<StateMachine>,
    /// Throttles keyed by job type.
    pub throttles: Arc<ThrottleRegistry>,
    /// Claim path used by workers.
    pub scheduler: ClaimScheduler,
    /// Directory monitor.
    pub monitor: DirectoryMonitor,
    /// Operator surface.
    pub operator: Operator,
}

#[cfg(feature = "tokio-runtime")]
impl JobSystem {
    /// Start the periodic directory scan described by `config.dirmon`.
    ///
    /// Returns `None` when the scan is disabled. Must be called within a
    /// tokio runtime.
    #[must_use]
    pub fn start_dirmon(&self) -> Option<DirmonTicker> {
        let dirmon = &self.config.dirmon;
        if !dirmon.enabled {
            info!("dirmon disabled by configuration");
            return None;
        }
        Some(DirmonTicker::spawn(
            self.monitor.clone(),
            Duration::from_secs(dirmon.scan_interval_secs),
        ))
    }
}

/// Collects the collaborators of a [`JobSystem`].
pub struct JobSystemBuilder {
    config: SchedulerConfig,
    job_types: JobTypeRegistry,
    hooks: Vec<Arc<dyn TransitionHook>>,
    audit_to_log: bool,
}

impl JobSystemBuilder {
    /// Start from `config` and the registered job types.
    #[must_use]
    pub fn new(config: SchedulerConfig, job_types: JobTypeRegistry) -> Self {
        Self {
            config,
            job_types,
            hooks: Vec::new(),
            audit_to_log: true,
        }
    }

    /// Attach an extra transition hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Skip the tracing audit hook installed by default.
    #[must_use]
    pub const fn without_log_audit(mut self) -> Self {
        self.audit_to_log = false;
        self
    }

    /// Wire every component over `store` and `fs`.
    ///
    /// Throttles are installed in order: handler defaults, then configured
    /// running-job limits, then configured disables.
    ///
    /// # Errors
    ///
    /// `Backend` for invalid configuration; `ThrottleMisconfiguration` when a
    /// configured disable names a throttle that is not defined.
    pub fn build<S>(self, store: Arc<S>, fs: Arc<dyn FileSystem>) -> Result<JobSystem, SchedulerError>
    where
        S: Store + 'static,
    {
        let cfg = self.config;
        cfg.validate()
            .map_err(|e| SchedulerError::Backend(format!("config invalid: {e}")))?;

        let jobs: Arc<dyn JobStore> = store.clone();
        let entries: Arc<dyn DirmonStore> = store.clone();
        let matches: Arc<dyn MatchStore> = store;
        let job_types = Arc::new(self.job_types);

        let throttles = Arc::new(ThrottleRegistry::new());
        job_types.install_default_throttles(&throttles);
        for (job_type, throttle_cfg) in &cfg.throttles {
            if let Some(max) = throttle_cfg.max_running {
                let limit = if throttle_cfg.per_group {
                    RunningJobsLimit::per_group(max)
                } else {
                    RunningJobsLimit::new(max)
                };
                throttles.define(job_type, Arc::new(limit));
            }
            for name in &throttle_cfg.disabled {
                throttles.disable(job_type, name).map_err(|_| {
                    SchedulerError::ThrottleMisconfiguration {
                        throttle: name.clone(),
                        reason: format!("not defined for job type `{job_type}`"),
                    }
                })?;
            }
        }

        let mut machine = StateMachine::new(Arc::clone(&jobs), Arc::clone(&job_types), cfg.retry.max_attempts)
            .with_retry_policy(cfg.retry.policy);
        if self.audit_to_log {
            machine = machine.with_hook(Arc::new(AuditHook::new(TracingAuditSink)));
        }
        for hook in self.hooks {
            machine = machine.with_hook(hook);
        }
        let machine = Arc::new(machine);

        let evaluator = ThrottleEvaluator::new(Arc::clone(&throttles), Arc::clone(&jobs));
        let scheduler = ClaimScheduler::new(Arc::clone(&machine), evaluator);
        let monitor = DirectoryMonitor::new(Arc::clone(&machine), Arc::clone(&entries), matches, fs);
        let operator = Operator::new(Arc::clone(&machine), Arc::clone(&throttles), entries);

        info!(
            job_types = job_types.job_types().len(),
            workers = cfg.worker.worker_count,
            max_attempts = cfg.retry.max_attempts,
            dirmon = cfg.dirmon.enabled,
            "job system assembled"
        );

        Ok(JobSystem {
            config: cfg,
            job_types,
            machine,
            throttles,
            scheduler,
            monitor,
            operator,
        })
    }
}

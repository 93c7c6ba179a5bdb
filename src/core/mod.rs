//! Core scheduling abstractions: jobs, lifecycle, throttling, claiming and directory monitoring.

pub mod audit;
pub mod claim;
pub mod dirmon;
pub mod error;
pub mod filter;
pub mod handler;
pub mod job;
pub mod state_machine;
pub mod store;
pub mod throttle;

pub use audit::{
    build_audit_event, AuditEvent, AuditHook, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use claim::ClaimScheduler;
pub use dirmon::{
    DirectoryMonitor, DirmonEntry, DirmonState, FileMetadata, FileSystem, Fingerprint, MatchKey,
    MatchRecord, PathPattern, ScanReport,
};
pub use error::{AppResult, SchedulerError, ValidationErrors};
pub use filter::{ExclusionFilter, ExclusionHint, JobQuery};
pub use handler::{JobHandler, JobTypeRegistry};
pub use job::{
    Arguments, FailureDetail, JobRecord, JobState, JobVersion, NewJob, DEFAULT_PERFORM_METHOD,
};
pub use state_machine::{JobEvent, RetryPolicy, StateMachine, TransitionHook};
pub use store::{DirmonStore, JobStore, MatchStore, Store};
pub use throttle::{
    FnThrottle, RunningJobsLimit, Throttle, ThrottleContext, ThrottleDecision, ThrottleEvaluator,
    ThrottleRegistry,
};

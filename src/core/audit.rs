//! Audit trail of job lifecycle changes.
//!
//! [`AuditHook`] plugs into the state machine and forwards one event per
//! transition to a sink: in-memory for tests and dev, or the tracing pipeline.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::core::job::{JobRecord, JobState};
use crate::core::state_machine::{JobEvent, TransitionHook};
use crate::util::clock::now_ms;
use crate::util::serde::JobId;

/// One recorded lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique id of this event (UUIDv4).
    pub event_id: String,
    /// Related job.
    pub job_id: JobId,
    /// Job type of the related job.
    pub job_type: String,
    /// Action taken (create, start, complete, fail, pause, resume, abort, retry).
    pub action: String,
    /// State before the change; `None` for creation.
    pub from_state: Option<JobState>,
    /// State after the change.
    pub to_state: JobState,
    /// Worker holding the claim, if any.
    pub worker: Option<String>,
    /// When the event was recorded, epoch milliseconds.
    pub created_at_ms: u128,
    /// Event-specific payload, e.g. the failure message.
    pub detail: Option<Value>,
}

/// Destination for audit events.
pub trait AuditSink: Send {
    /// Store or forward one event.
    fn record(&mut self, event: AuditEvent);
}

/// Keeps the most recent events in memory, dropping the oldest when full.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Sink holding at most `max_events` events. Zero disables recording.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Copy of the retained events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink emitting each event as an `info` record on the `job_lot::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        info!(
            target: "job_lot::audit",
            event_id = %event.event_id,
            job_id = %event.job_id,
            job_type = %event.job_type,
            action = %event.action,
            from = ?event.from_state,
            to = %event.to_state,
            worker = ?event.worker,
            "audit"
        );
    }
}

/// Helper to build an audit event from a job after a change.
#[must_use]
pub fn build_audit_event(
    job: &JobRecord,
    action: impl Into<String>,
    from_state: Option<JobState>,
    detail: Option<Value>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        job_id: job.id,
        job_type: job.job_type.clone(),
        action: action.into(),
        from_state,
        to_state: job.state,
        worker: job
            .claimed_by
            .clone()
            .or_else(|| job.failure.as_ref().and_then(|f| f.worker.clone())),
        created_at_ms: now_ms(),
        detail,
    }
}

/// State machine hook writing every change to an [`AuditSink`].
pub struct AuditHook<S: AuditSink> {
    sink: Mutex<S>,
}

impl<S: AuditSink> AuditHook<S> {
    /// Wrap `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Run `f` with the sink locked.
    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.sink.lock())
    }
}

impl<S: AuditSink> TransitionHook for AuditHook<S> {
    fn after(&self, job: &JobRecord, from: JobState, event: &JobEvent) {
        let detail = match event {
            JobEvent::Fail { message } => Some(Value::String(message.clone())),
            _ => None,
        };
        self.sink
            .lock()
            .record(build_audit_event(job, event.name(), Some(from), detail));
    }

    fn after_create(&self, job: &JobRecord) {
        self.sink
            .lock()
            .record(build_audit_event(job, "create", None, None));
    }
}

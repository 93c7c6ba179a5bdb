//! Tests for the audit trail

use std::sync::Arc;

use async_trait::async_trait;
use prometheus_job_lot::core::{
    AppResult, Arguments, AuditHook, AuditSink, InMemoryAuditSink, JobHandler, JobState,
    JobTypeRegistry, NewJob, StateMachine,
};
use prometheus_job_lot::infra::InMemoryStore;
use serde_json::{json, Value};

struct Echo;

#[async_trait]
impl JobHandler for Echo {
    fn job_type(&self) -> &str {
        "Echo"
    }

    fn arity(&self, perform_method: &str) -> Option<usize> {
        (perform_method == "perform").then_some(1)
    }

    async fn perform(&self, _perform_method: &str, arguments: &Arguments) -> AppResult<Value> {
        Ok(arguments.get(0).cloned().unwrap_or(Value::Null))
    }
}

#[test]
fn test_in_memory_audit_sink_overflow() {
    let hook = AuditHook::new(InMemoryAuditSink::new(2));
    let registry = JobTypeRegistry::new().with_handler(Arc::new(Echo)).unwrap();
    let job = NewJob::new("Echo")
        .with_arguments(vec![json!(1)])
        .build(&registry, 10)
        .unwrap();
    for _ in 0..3 {
        prometheus_job_lot::core::TransitionHook::after_create(&hook, &job);
    }
    assert_eq!(hook.with_sink(InMemoryAuditSink::events).len(), 2);
}

#[test]
fn test_audit_hook_follows_lifecycle() {
    let hook = Arc::new(AuditHook::new(InMemoryAuditSink::new(16)));
    let registry = JobTypeRegistry::new().with_handler(Arc::new(Echo)).unwrap();
    let machine = StateMachine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), 3)
        .with_hook(hook.clone());

    let job = machine
        .create(NewJob::new("Echo").with_arguments(vec![json!("x")]), 10)
        .unwrap();
    machine.abort(job.id, 20).unwrap();

    let events = hook.with_sink(InMemoryAuditSink::events);
    let actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["create", "abort"]);
    assert_eq!(events[1].from_state, Some(JobState::Queued));
    assert_eq!(events[1].to_state, JobState::Aborted);
    assert!(events.iter().all(|e| e.job_id == job.id && e.created_at_ms > 0));
}

#[test]
fn test_custom_sink() {
    struct Counting(usize);
    impl AuditSink for Counting {
        fn record(&mut self, _event: prometheus_job_lot::core::AuditEvent) {
            self.0 += 1;
        }
    }

    let hook = Arc::new(AuditHook::new(Counting(0)));
    let registry = JobTypeRegistry::new().with_handler(Arc::new(Echo)).unwrap();
    let machine = StateMachine::new(Arc::new(InMemoryStore::new()), Arc::new(registry), 3)
        .with_hook(hook.clone());
    machine
        .create(NewJob::new("Echo").with_arguments(vec![json!(1)]), 10)
        .unwrap();
    assert_eq!(hook.with_sink(|sink| sink.0), 1);
}

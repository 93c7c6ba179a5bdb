//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use prometheus_job_lot::builders::{JobSystem, JobSystemBuilder};
use prometheus_job_lot::config::{SchedulerConfig, ThrottleConfig};
use prometheus_job_lot::core::{
    AppResult, Arguments, JobHandler, JobTypeRegistry, RunningJobsLimit, Throttle,
};
use prometheus_job_lot::infra::{InMemoryFileSystem, InMemoryStore};
use prometheus_job_lot::util::init_test_tracing;
use serde_json::{json, Value};

/// Fixed clock used by deterministic tests.
pub const T0: u128 = 1_700_000_000_000;

/// `perform(x)` echoes `x`; `sum(a, b)` adds.
pub struct SumJob;

#[async_trait]
impl JobHandler for SumJob {
    fn job_type(&self) -> &str {
        "Sum"
    }

    fn arity(&self, perform_method: &str) -> Option<usize> {
        match perform_method {
            "perform" => Some(1),
            "sum" => Some(2),
            _ => None,
        }
    }

    async fn perform(&self, perform_method: &str, arguments: &Arguments) -> AppResult<Value> {
        match perform_method {
            "perform" => Ok(arguments.get(0).cloned().unwrap_or(Value::Null)),
            "sum" => {
                let a = arguments.get(0).and_then(Value::as_i64).ok_or_else(|| anyhow!("a is not an integer"))?;
                let b = arguments.get(1).and_then(Value::as_i64).ok_or_else(|| anyhow!("b is not an integer"))?;
                Ok(json!(a + b))
            }
            other => bail!("unknown method {other}"),
        }
    }
}

/// Takes no arguments and sleeps briefly. Ships a running-jobs limit of one.
pub struct SerialJob;

#[async_trait]
impl JobHandler for SerialJob {
    fn job_type(&self) -> &str {
        "Serial"
    }

    fn arity(&self, perform_method: &str) -> Option<usize> {
        (perform_method == "perform").then_some(0)
    }

    fn default_throttles(&self) -> Vec<Arc<dyn Throttle>> {
        vec![Arc::new(RunningJobsLimit::new(1))]
    }

    async fn perform(&self, _perform_method: &str, _arguments: &Arguments) -> AppResult<Value> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(Value::Null)
    }
}

/// Unthrottled unless configured; takes no arguments.
pub struct BulkJob;

#[async_trait]
impl JobHandler for BulkJob {
    fn job_type(&self) -> &str {
        "Bulk"
    }

    fn arity(&self, perform_method: &str) -> Option<usize> {
        (perform_method == "perform").then_some(0)
    }

    async fn perform(&self, _perform_method: &str, _arguments: &Arguments) -> AppResult<Value> {
        Ok(json!("done"))
    }
}

/// Always errors.
pub struct BrokenJob;

#[async_trait]
impl JobHandler for BrokenJob {
    fn job_type(&self) -> &str {
        "Broken"
    }

    fn arity(&self, perform_method: &str) -> Option<usize> {
        (perform_method == "perform").then_some(0)
    }

    async fn perform(&self, _perform_method: &str, _arguments: &Arguments) -> AppResult<Value> {
        bail!("boom")
    }
}

/// Registry with every fixture handler.
pub fn job_types() -> JobTypeRegistry {
    JobTypeRegistry::new()
        .with_handler(Arc::new(SumJob))
        .and_then(|r| r.with_handler(Arc::new(SerialJob)))
        .and_then(|r| r.with_handler(Arc::new(BulkJob)))
        .and_then(|r| r.with_handler(Arc::new(BrokenJob)))
        .unwrap()
}

/// Small, fast configuration.
pub fn config() -> SchedulerConfig {
    let mut cfg = SchedulerConfig::default();
    cfg.worker.worker_count = 2;
    cfg.worker.poll_interval_ms = 5;
    cfg.retry.max_attempts = 2;
    cfg
}

/// Configuration limiting `Bulk` to `max_running` concurrent jobs.
pub fn config_with_bulk_limit(max_running: usize) -> SchedulerConfig {
    let mut cfg = config();
    cfg.throttles.insert(
        "Bulk".into(),
        ThrottleConfig {
            max_running: Some(max_running),
            ..ThrottleConfig::default()
        },
    );
    cfg
}

/// A system over fresh in-memory backends.
pub struct Harness {
    pub system: JobSystem,
    pub store: Arc<InMemoryStore>,
    pub fs: Arc<InMemoryFileSystem>,
}

pub fn harness(cfg: SchedulerConfig) -> Harness {
    init_test_tracing();
    let store = Arc::new(InMemoryStore::new());
    let fs = Arc::new(InMemoryFileSystem::new());
    let system = JobSystemBuilder::new(cfg, job_types())
        .without_log_audit()
        .build(Arc::clone(&store), fs.clone())
        .unwrap();
    Harness { system, store, fs }
}

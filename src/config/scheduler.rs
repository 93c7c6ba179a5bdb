//! Scheduler configuration structures.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::state_machine::RetryPolicy;

const ENV_PREFIX: &str = "JOB_LOT_";

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Sleep between claim attempts when nothing is runnable, in milliseconds.
    pub poll_interval_ms: u64,
    /// Worker identities are `{name_prefix}-{index}`.
    pub name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            poll_interval_ms: 500,
            name_prefix: "worker".into(),
        }
    }
}

/// Failure retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of `retry` transitions per job.
    pub max_attempts: u32,
    /// What a retried job keeps from its schedule.
    pub policy: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            policy: RetryPolicy::default(),
        }
    }
}

/// Directory monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirmonConfig {
    /// Run the periodic scan.
    pub enabled: bool,
    /// Seconds between scans.
    pub scan_interval_secs: u64,
}

impl Default for DirmonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
        }
    }
}

/// Throttle settings for one job type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Install a running-jobs limit of this size.
    pub max_running: Option<usize>,
    /// Count the limit per throttle group instead of per type.
    pub per_group: bool,
    /// Throttles registered for the type that start disabled.
    pub disabled: Vec<String>,
}

/// Root scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker pool settings.
    pub worker: WorkerConfig,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Directory monitor settings.
    pub dirmon: DirmonConfig,
    /// Map of job type to throttle settings.
    pub throttles: HashMap<String, ThrottleConfig>,
}

impl SchedulerConfig {
    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// A message naming the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.worker.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.worker.name_prefix.trim().is_empty() {
            return Err("name_prefix must not be blank".into());
        }
        if self.dirmon.enabled && self.dirmon.scan_interval_secs == 0 {
            return Err("scan_interval_secs must be greater than 0".into());
        }
        for (job_type, throttle) in &self.throttles {
            if throttle.max_running == Some(0) {
                return Err(format!(
                    "throttle for `{job_type}` invalid: max_running must be greater than 0"
                ));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failures.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `JOB_LOT_*` environment variables, after loading `.env` if present.
    ///
    /// Recognised: `WORKER_COUNT`, `POLL_INTERVAL_MS`, `WORKER_PREFIX`,
    /// `MAX_ATTEMPTS`, `RETRY_POLICY` (`preserve_schedule` | `reschedule`),
    /// `DIRMON_ENABLED`, `DIRMON_INTERVAL_SECS`.
    ///
    /// # Errors
    ///
    /// Unparseable values or a configuration that fails validation.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build from an arbitrary key lookup; keys are given without the prefix.
    ///
    /// # Errors
    ///
    /// As for [`SchedulerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "WORKER_COUNT")? {
            cfg.worker.worker_count = v;
        }
        if let Some(v) = parse_var(&lookup, "POLL_INTERVAL_MS")? {
            cfg.worker.poll_interval_ms = v;
        }
        if let Some(v) = lookup("WORKER_PREFIX") {
            cfg.worker.name_prefix = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_ATTEMPTS")? {
            cfg.retry.max_attempts = v;
        }
        if let Some(v) = lookup("RETRY_POLICY") {
            cfg.retry.policy = serde_json::from_value(serde_json::Value::String(v.clone()))
                .map_err(|_| format!("{ENV_PREFIX}RETRY_POLICY: unknown policy `{v}`"))?;
        }
        if let Some(v) = parse_var(&lookup, "DIRMON_ENABLED")? {
            cfg.dirmon.enabled = v;
        }
        if let Some(v) = parse_var(&lookup, "DIRMON_INTERVAL_SECS")? {
            cfg.dirmon.scan_interval_secs = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{ENV_PREFIX}{key}: {e}"))
        })
        .transpose()
}

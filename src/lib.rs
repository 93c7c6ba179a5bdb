//! # Prometheus Job Lot
//!
//! The scheduling core of a distributed background-job platform.
//!
//! Many worker processes pull jobs from a shared durable store. A state
//! machine governs each job's lifecycle, throttles bound how many jobs of a
//! type run at once, and a directory monitor turns files appearing under
//! watched patterns into queued jobs exactly once per file version.
//!
//! ## Key Features
//!
//! - **Lifecycle state machine**: queued, running, paused, failed, aborted and
//!   completed, with hooks and bounded retries
//! - **Lock-free claiming**: workers race through one conditional update per
//!   claim; losers move on to the next candidate
//! - **Throttles**: per job type, runtime togglable, with exclusion hints that
//!   keep a claim pass from re-evaluating throttled work
//! - **Directory monitor**: glob patterns, content fingerprints and a
//!   first-writer-wins match record
//! - **Pluggable storage**: in-memory and JSONL-file stores behind the
//!   `JobStore`, `DirmonStore` and `MatchStore` traits
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_job_lot::builders::JobSystemBuilder;
//! use prometheus_job_lot::config::SchedulerConfig;
//! use prometheus_job_lot::core::{DirmonEntry, JobTypeRegistry};
//! use prometheus_job_lot::infra::{InMemoryStore, LocalFileSystem};
//! use prometheus_job_lot::runtime::WorkerPool;
//!
//! let job_types = JobTypeRegistry::new().with_handler(Arc::new(SumJob))?;
//! let system = JobSystemBuilder::new(SchedulerConfig::from_env()?, job_types)
//!     .build(Arc::new(InMemoryStore::new()), Arc::new(LocalFileSystem::new()))?;
//!
//! system.operator.create_entry(
//!     DirmonEntry::new("/watched/**", "Sum")
//!         .with_perform_method("sum")
//!         .with_arguments(vec![1.into(), 2.into()]),
//! )?;
//! system.monitor.scan(now_ms())?;
//!
//! let pool = WorkerPool::start(&system.config.worker, system.scheduler.clone(), system.job_types.clone())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: jobs, lifecycle, throttles, claiming and directory monitoring.
pub mod core;
/// Configuration models for workers, retries, the monitor and throttles.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters for storage and filesystem access.
pub mod infra;
/// Runtime adapters and the operator API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

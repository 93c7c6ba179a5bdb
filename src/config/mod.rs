//! Configuration models for workers, retries, the directory monitor and throttles.

pub mod scheduler;

pub use scheduler::{DirmonConfig, RetryConfig, SchedulerConfig, ThrottleConfig, WorkerConfig};

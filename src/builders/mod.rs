//! Builders to construct scheduler components from configuration.

pub mod system_builder;

pub use system_builder::{JobSystem, JobSystemBuilder};

//! Runtime adapters (worker threads, scan ticker) and the operator API surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod ticker;
#[cfg(all(feature = "tokio-runtime", not(target_arch = "wasm32")))]
pub mod worker_pool;

pub use api::{EntryEdit, Health, JobStatusResponse, Operator};
#[cfg(feature = "tokio-runtime")]
pub use ticker::DirmonTicker;
#[cfg(all(feature = "tokio-runtime", not(target_arch = "wasm32")))]
pub use worker_pool::{WorkerPool, WorkerPoolStats};

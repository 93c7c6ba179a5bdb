//! Native worker pool using OS threads.
//!
//! Each worker thread owns a single-threaded tokio runtime and loops
//! claim → perform → complete/fail. Workers never share a lock: the only
//! coordination between them is the claim's conditional update.
//!
//! Shutdown drops the stop sender, which wakes every idle worker at once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::core::{ClaimScheduler, JobRecord, JobTypeRegistry, SchedulerError};
use crate::util::clock::now_ms;

/// Counters shared by all workers.
#[derive(Debug, Default)]
struct PoolCounters {
    claimed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPoolStats {
    /// Live worker threads.
    pub workers: usize,
    /// Jobs claimed since start.
    pub claimed: u64,
    /// Jobs completed since start.
    pub completed: u64,
    /// Jobs failed by their handler since start.
    pub failed: u64,
    /// Claimed jobs failed because they had expired.
    pub expired: u64,
}

/// Thread pool pulling jobs through a [`ClaimScheduler`].
pub struct WorkerPool {
    stop_tx: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers.
    ///
    /// # Errors
    ///
    /// `Backend` for invalid configuration or when a thread cannot be spawned.
    pub fn start(
        config: &WorkerConfig,
        scheduler: ClaimScheduler,
        job_types: Arc<JobTypeRegistry>,
    ) -> Result<Self, SchedulerError> {
        if config.worker_count == 0 {
            return Err(SchedulerError::Backend("worker_count must be greater than 0".into()));
        }
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let counters = Arc::new(PoolCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let poll = Duration::from_millis(config.poll_interval_ms.max(1));

        let mut workers = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            let worker = Worker {
                name: format!("{}-{index}", config.name_prefix),
                scheduler: scheduler.clone(),
                job_types: Arc::clone(&job_types),
                counters: Arc::clone(&counters),
                shutdown: Arc::clone(&shutdown),
                stop_rx: stop_rx.clone(),
                poll,
            };
            let handle = thread::Builder::new()
                .name(format!("job-worker-{index}"))
                .spawn(move || worker.run())
                .map_err(|e| SchedulerError::Backend(format!("spawn worker thread: {e}")))?;
            workers.push(handle);
        }

        info!(
            worker_count = config.worker_count,
            poll_interval_ms = config.poll_interval_ms,
            "worker pool started"
        );

        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            workers: Mutex::new(workers),
            counters,
            shutdown,
        })
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            workers: self.workers.lock().len(),
            claimed: self.counters.claimed.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        }
    }

    /// True once [`WorkerPool::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop all workers and wait for in-flight jobs to finish.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down worker pool");
        self.stop_tx.lock().take();

        let mut workers = self.workers.lock();
        for (index, handle) in workers.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker = index, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    name: String,
    scheduler: ClaimScheduler,
    job_types: Arc<JobTypeRegistry>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
    poll: Duration,
}

impl Worker {
    fn run(self) {
        debug!(worker = %self.name, "worker thread started");
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!(worker = %self.name, error = %e, "failed to create worker runtime");
                return;
            }
        };

        while !self.shutdown.load(Ordering::Acquire) {
            match self.scheduler.claim_any(&self.name, now_ms()) {
                Ok(Some(job)) => {
                    self.counters.claimed.fetch_add(1, Ordering::Relaxed);
                    self.execute(&rt, &job);
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!(worker = %self.name, error = %e, "claim failed"),
            }
            match self.stop_rx.recv_timeout(self.poll) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = %self.name, "worker thread exiting");
    }

    fn execute(&self, rt: &tokio::runtime::Runtime, job: &JobRecord) {
        let machine = self.scheduler.machine();
        let now = now_ms();
        if job.is_expired(now) {
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = machine.expire(job, now) {
                warn!(worker = %self.name, job_id = %job.id, error = %e, "could not expire job");
            }
            return;
        }

        let Some(handler) = self.job_types.get(&job.job_type) else {
            self.record_failure(job, &SchedulerError::HandlerFailure(format!(
                "no handler registered for job type `{}`",
                job.job_type
            )));
            return;
        };

        debug!(worker = %self.name, job_id = %job.id, job_type = %job.job_type, "performing job");
        let outcome = rt.block_on(handler.perform(&job.perform_method, &job.arguments));
        match outcome {
            Ok(result) => match machine.complete(job, result, now_ms()) {
                Ok(_) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                // Paused, aborted or re-claimed while running.
                Err(e) => warn!(worker = %self.name, job_id = %job.id, error = %e, "result discarded"),
            },
            Err(e) => self.record_failure(job, &SchedulerError::HandlerFailure(format!("{e:#}"))),
        }
    }

    fn record_failure(&self, job: &JobRecord, failure: &SchedulerError) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        warn!(worker = %self.name, job_id = %job.id, error = %failure, "job failed");
        if let Err(e) = self
            .scheduler
            .machine()
            .fail(job, failure.to_string(), now_ms())
        {
            warn!(worker = %self.name, job_id = %job.id, error = %e, "could not record failure");
        }
    }
}

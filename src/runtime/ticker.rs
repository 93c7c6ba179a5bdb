//! Periodic directory-monitor pass on the tokio runtime.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::core::DirectoryMonitor;
use crate::util::clock::now_ms;

/// Handle to a running scan loop.
pub struct DirmonTicker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DirmonTicker {
    /// Scan immediately, then every `every`. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(monitor: DirectoryMonitor, every: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticks = interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = every.as_millis(), "dirmon ticker started");
            loop {
                tokio::select! {
                    _ = ticks.tick() => {}
                    _ = stopped.changed() => break,
                }
                // Scans walk the filesystem; keep them off the async workers.
                let pass = monitor.clone();
                match tokio::task::spawn_blocking(move || pass.scan(now_ms())).await {
                    Ok(Ok(report)) => debug!(
                        spawned = report.spawned.len(),
                        failed = report.failed_entries.len(),
                        "dirmon tick"
                    ),
                    Ok(Err(e)) => error!(error = %e, "dirmon scan failed"),
                    Err(e) => error!(error = %e, "dirmon scan task panicked"),
                }
            }
            debug!("dirmon ticker stopped");
        });
        Self { stop, handle }
    }

    /// Stop the loop and wait for an in-flight scan to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "dirmon ticker task failed");
        }
    }
}

//! Periodic scan of enabled entries.
//!
//! Each file version is claimed by inserting its match record before the job
//! is persisted. A monitor that loses the insert skips the file, so two
//! monitors scanning the same tree spawn one job per file version between
//! them. If the job cannot be persisted the match is released and the file
//! is picked up again on the next pass.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::dirmon::entry::{DirmonEntry, DirmonState};
use crate::core::dirmon::fs::FileSystem;
use crate::core::dirmon::matches::{Fingerprint, MatchKey, MatchRecord};
use crate::core::dirmon::pattern::PathPattern;
use crate::core::error::SchedulerError;
use crate::core::state_machine::StateMachine;
use crate::core::store::{DirmonStore, MatchStore};
use crate::util::serde::{EntryId, JobId};

/// Outcome of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Enabled entries visited.
    pub entries_scanned: usize,
    /// Jobs spawned, in spawn order.
    pub spawned: Vec<JobId>,
    /// Files skipped because their current version was already matched.
    pub duplicates: usize,
    /// Entries moved to `failed` during this pass, with the reason.
    pub failed_entries: Vec<(EntryId, String)>,
}

/// Converts new files under enabled entries into queued jobs.
#[derive(Clone)]
pub struct DirectoryMonitor {
    machine: Arc<StateMachine>,
    entries: Arc<dyn DirmonStore>,
    matches: Arc<dyn MatchStore>,
    fs: Arc<dyn FileSystem>,
}

impl DirectoryMonitor {
    /// Wire a monitor to its collaborators.
    pub fn new(
        machine: Arc<StateMachine>,
        entries: Arc<dyn DirmonStore>,
        matches: Arc<dyn MatchStore>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            machine,
            entries,
            matches,
            fs,
        }
    }

    /// Entry store the monitor reads.
    #[must_use]
    pub fn entries(&self) -> &Arc<dyn DirmonStore> {
        &self.entries
    }

    /// Scan every enabled entry once.
    ///
    /// A failing entry is moved to `failed` and the pass continues with the
    /// next one.
    ///
    /// # Errors
    ///
    /// Only when the entry store itself fails; entry-level problems are
    /// recorded on the entry and in the report.
    pub fn scan(&self, now_ms: u128) -> Result<ScanReport, SchedulerError> {
        let mut report = ScanReport::default();
        for entry in self.entries.list_entries(Some(DirmonState::Enabled))? {
            report.entries_scanned += 1;
            match self.scan_entry(&entry, now_ms, &mut report) {
                Ok(()) => {
                    self.entries
                        .update_entry(entry.id, &|e: &mut DirmonEntry| e.last_scanned_ms = Some(now_ms))?;
                }
                Err(err) => {
                    let reason = err.to_string();
                    error!(entry_id = %entry.id, pattern = %entry.pattern, error = %reason, "dirmon entry failed");
                    self.entries.update_entry(entry.id, &|e: &mut DirmonEntry| {
                        e.state = DirmonState::Failed;
                        e.failure = Some(reason.clone());
                        e.last_scanned_ms = Some(now_ms);
                    })?;
                    report.failed_entries.push((entry.id, reason));
                }
            }
        }
        if !report.spawned.is_empty() || !report.failed_entries.is_empty() {
            info!(
                entries = report.entries_scanned,
                spawned = report.spawned.len(),
                duplicates = report.duplicates,
                failed = report.failed_entries.len(),
                "dirmon scan finished"
            );
        }
        Ok(report)
    }

    fn scan_entry(
        &self,
        entry: &DirmonEntry,
        now_ms: u128,
        report: &mut ScanReport,
    ) -> Result<(), SchedulerError> {
        entry.validate(self.machine.job_types())?;
        let pattern = PathPattern::parse(&entry.pattern)?;
        for path in self.resolve(&pattern)? {
            if let Some(job_id) = self.spawn_for(entry, &pattern, &path, now_ms)? {
                report.spawned.push(job_id);
            } else {
                report.duplicates += 1;
            }
        }
        Ok(())
    }

    fn resolve(&self, pattern: &PathPattern) -> Result<Vec<PathBuf>, SchedulerError> {
        let scan_error = |e: io::Error| SchedulerError::Scan {
            pattern: pattern.as_str().to_string(),
            reason: e.to_string(),
        };
        if pattern.is_literal() {
            return match self.fs.metadata(pattern.root()) {
                Ok(_) => Ok(vec![pattern.root().to_path_buf()]),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(scan_error(e)),
            };
        }
        let mut files = match self.fs.walk(pattern.root()) {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(scan_error(e)),
        };
        files.retain(|path| pattern.matches(path));
        files.sort();
        Ok(files)
    }

    /// Spawn a job for `path` unless its current version is already matched.
    fn spawn_for(
        &self,
        entry: &DirmonEntry,
        pattern: &PathPattern,
        path: &Path,
        now_ms: u128,
    ) -> Result<Option<JobId>, SchedulerError> {
        let metadata = match self.fs.metadata(path) {
            Ok(metadata) => metadata,
            // Removed between walk and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SchedulerError::Scan {
                    pattern: pattern.as_str().to_string(),
                    reason: format!("{}: {e}", path.display()),
                })
            }
        };
        let absolute = self.fs.absolute(path).map_err(|e| SchedulerError::Scan {
            pattern: pattern.as_str().to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        let key = MatchKey {
            entry_id: entry.id,
            path: absolute.clone(),
            fingerprint: Fingerprint::from(metadata),
        };
        if self.matches.contains_match(&key)? {
            return Ok(None);
        }

        let job = entry
            .job_template(&absolute)
            .build(self.machine.job_types(), now_ms)?;
        let won = self.matches.insert_match(MatchRecord {
            key: key.clone(),
            job_id: job.id,
            matched_at_ms: now_ms,
        })?;
        if !won {
            debug!(entry_id = %entry.id, path = %absolute.display(), "file already matched elsewhere");
            return Ok(None);
        }

        match self.machine.enqueue(job) {
            Ok(job) => {
                debug!(entry_id = %entry.id, job_id = %job.id, path = %absolute.display(), "dirmon spawned job");
                Ok(Some(job.id))
            }
            Err(err) => {
                if let Err(release) = self.matches.remove_match(&key) {
                    error!(
                        entry_id = %entry.id,
                        path = %absolute.display(),
                        error = %release,
                        "could not release match; file stays matched"
                    );
                }
                Err(err)
            }
        }
    }
}

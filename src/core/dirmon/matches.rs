//! Match records: which files have already been turned into jobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::dirmon::fs::FileMetadata;
use crate::util::serde::{EntryId, JobId};

/// Identifies one version of a file's content.
///
/// Modification time plus size, so an overwritten file counts as new work
/// while an untouched one never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Last modification time, epoch milliseconds.
    pub modified_ms: u128,
    /// Size in bytes.
    pub size: u64,
}

impl From<FileMetadata> for Fingerprint {
    fn from(meta: FileMetadata) -> Self {
        Self {
            modified_ms: meta.modified_ms,
            size: meta.size,
        }
    }
}

/// Unique key of a match record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    /// Entry whose pattern matched.
    pub entry_id: EntryId,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Content fingerprint at match time.
    pub fingerprint: Fingerprint,
}

/// A file version that has been converted into a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unique key.
    pub key: MatchKey,
    /// Job spawned for the file.
    pub job_id: JobId,
    /// When the match was recorded.
    pub matched_at_ms: u128,
}

//! Directory monitor: turns files appearing under watched patterns into queued jobs.

pub mod entry;
pub mod fs;
pub mod matches;
pub mod monitor;
pub mod pattern;

pub use entry::{DirmonEntry, DirmonState};
pub use fs::{FileMetadata, FileSystem};
pub use matches::{Fingerprint, MatchKey, MatchRecord};
pub use monitor::{DirectoryMonitor, ScanReport};
pub use pattern::PathPattern;

//! Filesystem collaborator consumed by the directory monitor.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Content-identifying metadata of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Last modification time, epoch milliseconds.
    pub modified_ms: u128,
    /// Size in bytes.
    pub size: u64,
}

/// Read-only view of a filesystem.
pub trait FileSystem: Send + Sync {
    /// Every regular file below `root`, recursively.
    ///
    /// # Errors
    ///
    /// `NotFound` when `root` does not exist; other I/O errors as reported.
    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    /// Metadata of the regular file at `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` when there is no such file.
    fn metadata(&self, path: &Path) -> io::Result<FileMetadata>;

    /// Absolute form of `path`, used to key match records.
    ///
    /// # Errors
    ///
    /// Implementations may fail to resolve the working directory.
    fn absolute(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

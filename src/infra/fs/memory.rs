//! In-memory filesystem for tests and simulations.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::core::dirmon::{FileMetadata, FileSystem};

/// A flat map of absolute paths to metadata. Directories exist implicitly.
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, FileMetadata>>,
}

impl InMemoryFileSystem {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file.
    pub fn write(&self, path: impl Into<PathBuf>, modified_ms: u128, size: u64) {
        self.files
            .write()
            .insert(path.into(), FileMetadata { modified_ms, size });
    }

    /// Delete a file. Returns false if it did not exist.
    pub fn remove(&self, path: &Path) -> bool {
        self.files.write().remove(path).is_some()
    }
}

impl FileSystem for InMemoryFileSystem {
    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let files = self.files.read();
        let found: Vec<PathBuf> = files
            .keys()
            .filter(|path| path.starts_with(root) && path.as_path() != root)
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", root.display()),
            ));
        }
        Ok(found)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        self.files.read().get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }
}

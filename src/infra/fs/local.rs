//! Local disk adapter for the directory monitor.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::core::dirmon::{FileMetadata, FileSystem};
use crate::util::clock::system_time_ms;

/// Reads the host filesystem. Symlinks are not followed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn walk(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        // Surface a missing root as NotFound instead of an empty walk.
        fs::metadata(root)?;
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                // Deleted while the walk was in progress.
                Err(e) if e.io_error().is_some_and(|cause| cause.kind() == io::ErrorKind::NotFound) => {
                    debug!(root = %root.display(), error = %e, "path vanished during walk");
                }
                // A partial listing would look like files were never there.
                Err(e) => return Err(io::Error::from(e)),
            }
        }
        Ok(files)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileMetadata> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(FileMetadata {
            modified_ms: system_time_ms(meta.modified()?),
            size: meta.len(),
        })
    }

    fn absolute(&self, path: &Path) -> io::Result<PathBuf> {
        std::path::absolute(path)
    }
}

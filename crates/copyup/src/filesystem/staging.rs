//! Staging and shadow directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use copyup_common::{CopyUpError, CopyUpResult};

/// Create a directory with a randomized name under `parent` and keep it.
///
/// The name is `prefix` followed by a random suffix; creation is retried on
/// collision.
pub fn unique_dir(parent: &Path, prefix: &str) -> io::Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?;
    Ok(dir.keep())
}

/// Scratch directory that receives the recursive bind mount of each target
/// before it is relocated into the target's shadow directory.
///
/// Dropping it removes the directory entry only. Removal is `rmdir`, never a
/// recursive delete, so a bind mount still attached after a failed run is
/// left alone instead of having its content wiped.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Allocate a fresh staging directory under `root`.
    pub fn allocate(root: &Path, prefix: &str) -> CopyUpResult<Self> {
        let path = unique_dir(root, prefix).map_err(|source| CopyUpError::Allocation {
            root: root.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "Allocated staging directory");
        Ok(Self { path })
    }

    /// Path of the staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        match fs::remove_dir(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed staging directory");
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staging directory"
                );
            }
        }
    }
}

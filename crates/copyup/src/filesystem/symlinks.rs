//! Symlink reconstruction for copied-up directories.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use copyup_common::{CopyUpError, CopyUpResult, SymlinkStep};

/// A symlink standing in for one top-level entry of a copied-up directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkEntry {
    /// Entry name, shared by the original and the symlink.
    pub name: OsString,
    /// What the symlink points at.
    pub link_target: PathBuf,
    /// Where the symlink is created.
    pub destination: PathBuf,
}

/// Plan one symlink per top-level entry of `shadow`, placed in `target`.
///
/// Entries that are symlinks themselves keep their original target string
/// verbatim, so relative links resolve exactly as before. Everything else
/// points at `<shadow name>/<entry name>`, relative to `target`.
/// Entries are returned sorted by name.
pub fn plan_symlinks(target: &Path, shadow: &Path) -> CopyUpResult<Vec<SymlinkEntry>> {
    let enumeration = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CopyUpError::Enumeration { path, source }
    };

    let shadow_name = shadow.file_name().ok_or_else(|| CopyUpError::Enumeration {
        path: shadow.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "shadow directory has no name"),
    })?;

    let mut entries = fs::read_dir(shadow)
        .map_err(enumeration(shadow))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(enumeration(shadow))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut planned = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry.file_name();
        let source_path = entry.path();
        let file_type = entry.file_type().map_err(enumeration(&source_path))?;

        let link_target = if file_type.is_symlink() {
            fs::read_link(&source_path).map_err(enumeration(&source_path))?
        } else {
            Path::new(shadow_name).join(&name)
        };

        planned.push(SymlinkEntry {
            destination: target.join(&name),
            name,
            link_target,
        });
    }

    Ok(planned)
}

/// Put `entry` in place, replacing anything already at its destination.
///
/// Whatever sits at the destination is removed without inspection. Right
/// after a fresh tmpfs mount the only possible occupants are files the mount
/// machinery itself dropped there (such as an `mtab` written by `mount`), so
/// nothing of value is lost. Reusing this outside that window would need an
/// explicit check first.
pub fn place_symlink(entry: &SymlinkEntry) -> CopyUpResult<()> {
    remove_stale(&entry.destination).map_err(|source| CopyUpError::Symlink {
        step: SymlinkStep::RemoveStale,
        path: entry.destination.clone(),
        source,
    })?;

    std::os::unix::fs::symlink(&entry.link_target, &entry.destination).map_err(|source| {
        CopyUpError::Symlink {
            step: SymlinkStep::Create,
            path: entry.destination.clone(),
            source,
        }
    })?;

    tracing::debug!(
        link = %entry.destination.display(),
        target = %entry.link_target.display(),
        "Created symlink"
    );
    Ok(())
}

/// Remove a file, symlink or directory tree; a missing path is not an error.
fn remove_stale(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

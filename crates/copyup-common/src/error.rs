//! Error types for copy-up runs.

use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`CopyUpError`].
pub type CopyUpResult<T> = Result<T, CopyUpError>;

/// Mount sequencer step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStep {
    /// Recursive bind mount of the target onto the staging directory.
    Bind,
    /// Empty tmpfs mounted over the target.
    Tmpfs,
    /// Creation of the shadow directory inside the fresh tmpfs.
    Shadow,
    /// Relocation of the staging bind mount into the shadow directory.
    Move,
}

impl fmt::Display for MountStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bind => "bind mount",
            Self::Tmpfs => "tmpfs mount",
            Self::Shadow => "shadow directory creation",
            Self::Move => "mount relocation",
        })
    }
}

/// Symlink reconstruction step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkStep {
    /// Removal of whatever already sat at the destination.
    RemoveStale,
    /// Creation of the replacement symlink.
    Create,
}

impl fmt::Display for SymlinkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RemoveStale => "stale entry removal",
            Self::Create => "symlink creation",
        })
    }
}

/// Errors raised while copying up directories.
#[derive(Error, Diagnostic, Debug)]
pub enum CopyUpError {
    /// The staging directory could not be created.
    #[error("Failed to create staging directory under {}", root.display())]
    #[diagnostic(
        code(copyup::staging::allocation),
        help("The staging root must exist and be writable; set COPYUP_STAGING_ROOT to relocate it")
    )]
    Allocation {
        /// Reserved root the staging directory was created under.
        root: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The target is the staging root or one of its ancestors.
    #[error("{} cannot be copied up: it holds the staging root {}", path.display(), root.display())]
    #[diagnostic(
        code(copyup::path::reserved),
        help("Choose a different staging root, or drop this directory from the copy-up list")
    )]
    ReservedPath {
        /// Rejected target directory.
        path: PathBuf,
        /// Reserved staging root.
        root: PathBuf,
    },

    /// The target is not an absolute path.
    #[error("Copy-up target must be an absolute path: {}", path.display())]
    #[diagnostic(code(copyup::path::relative))]
    NotAbsolute {
        /// Rejected target directory.
        path: PathBuf,
    },

    /// A mount sequencer step failed.
    #[error("{} failed for {}", step, path.display())]
    #[diagnostic(
        code(copyup::mount),
        help("Copy-up needs CAP_SYS_ADMIN in the current mount namespace (try `unshare -rm`)")
    )]
    Mount {
        /// Which step failed.
        step: MountStep,
        /// Target directory being processed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The shadow directory could not be listed, or an entry in it read.
    #[error("Failed to read {}", path.display())]
    #[diagnostic(code(copyup::enumeration))]
    Enumeration {
        /// Shadow directory or entry that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A replacement symlink could not be put in place.
    #[error("{} failed at {}", step, path.display())]
    #[diagnostic(code(copyup::symlink))]
    Symlink {
        /// Which step failed.
        step: SymlinkStep,
        /// Symlink destination.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl CopyUpError {
    /// Path the failure is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Allocation { root, .. } => root,
            Self::ReservedPath { path, .. }
            | Self::NotAbsolute { path }
            | Self::Mount { path, .. }
            | Self::Enumeration { path, .. }
            | Self::Symlink { path, .. } => path,
        }
    }

    /// Short name of the stage that failed.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Allocation { .. } => "staging allocation",
            Self::ReservedPath { .. } | Self::NotAbsolute { .. } => "validation",
            Self::Mount { step, .. } => match step {
                MountStep::Bind => "bind mount",
                MountStep::Tmpfs => "tmpfs mount",
                MountStep::Shadow | MountStep::Move => "relocation",
            },
            Self::Enumeration { .. } => "enumeration",
            Self::Symlink { .. } => "symlink creation",
        }
    }
}

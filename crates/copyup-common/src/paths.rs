//! Reserved filesystem locations used by copy-up.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Default root the staging directory is created under.
///
/// The staging directory must live outside every directory that will be
/// copied up, so it defaults to `/tmp` rather than a runtime state dir
/// (which commonly sits below `/run`).
pub static STAGING_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("COPYUP_STAGING_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
});

/// Name prefix of the staging directory.
pub const STAGING_PREFIX: &str = "copyup-b";

/// Name prefix of the shadow directory created inside each target.
pub const SHADOW_PREFIX: &str = ".ro";

/// Locations reserved by a copy-up run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUpPaths {
    /// Root the staging directory is created under.
    pub staging_root: PathBuf,
}

impl CopyUpPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom staging root.
    #[must_use]
    pub fn with_staging_root(root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: root.into(),
        }
    }

    /// Whether copying up `dir` would bury the staging root under a tmpfs.
    ///
    /// True for the staging root itself and for any of its ancestors.
    #[must_use]
    pub fn is_reserved(&self, dir: &Path) -> bool {
        self.staging_root.starts_with(dir)
    }
}

impl Default for CopyUpPaths {
    fn default() -> Self {
        Self {
            staging_root: STAGING_ROOT.clone(),
        }
    }
}

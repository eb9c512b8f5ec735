//! Destinations that must stay absent after copy-up.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Set of absolute destination paths that get no symlink.
///
/// Membership is exact byte equality on the path as given: `/etc/apparmor`
/// does not exclude `/etc/apparmor.d`, and `/etc/apparmor/` excludes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    paths: HashSet<OsString>,
}

impl ExclusionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination path.
    pub fn insert(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into().into_os_string());
    }

    /// Whether `path` is excluded.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.paths.contains(path.as_os_str())
    }

    /// Number of excluded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut set = Self::new();
        for path in iter {
            set.insert(path);
        }
        set
    }
}

impl<P: Into<PathBuf>> Extend<P> for ExclusionSet {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        for path in iter {
            self.insert(path);
        }
    }
}

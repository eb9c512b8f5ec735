//! Copy-up configuration.

use std::path::{Path, PathBuf};

use copyup_common::paths::{SHADOW_PREFIX, STAGING_PREFIX, STAGING_ROOT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`CopyUpConfig`].
    #[error("Invalid config file {}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Copy-up driver options.
///
/// ```toml
/// staging_root = "/tmp"
/// exclude = ["/etc/apparmor", "/etc/apparmor.d"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyUpConfig {
    /// Reserved root the staging directory is created under.
    pub staging_root: PathBuf,
    /// Name prefix of the staging directory.
    pub staging_prefix: String,
    /// Name prefix of the shadow directory inside each target.
    pub shadow_prefix: String,
    /// Destination paths that get no symlink.
    pub exclude: Vec<PathBuf>,
}

impl Default for CopyUpConfig {
    fn default() -> Self {
        Self {
            staging_root: STAGING_ROOT.clone(),
            staging_prefix: STAGING_PREFIX.to_string(),
            shadow_prefix: SHADOW_PREFIX.to_string(),
            exclude: Vec::new(),
        }
    }
}

impl CopyUpConfig {
    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set the staging root.
    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    /// Set the shadow directory prefix.
    #[must_use]
    pub fn with_shadow_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shadow_prefix = prefix.into();
        self
    }

    /// Add excluded destination paths.
    #[must_use]
    pub fn with_exclusions<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.exclude.extend(paths.into_iter().map(Into::into));
        self
    }
}

//! The tmpfs + symlink copy-up driver.
//!
//! For every target directory, in order:
//! 1. recursively bind the target onto the staging directory
//! 2. mount an empty tmpfs over the target
//! 3. create a randomized shadow directory inside the tmpfs
//! 4. move the staging bind mount onto the shadow directory
//! 5. recreate each top-level entry of the shadow as a symlink in the target
//!
//! A failure stops the run. Directories finished before it stay copied up;
//! their mounts are never rolled back.

mod config;
mod exclusion;

pub use config::{ConfigError, CopyUpConfig};
pub use exclusion::ExclusionSet;

use std::io;
use std::path::{Path, PathBuf};

use copyup_common::{CopyUpError, CopyUpPaths, CopyUpResult, MountStep};
use miette::Diagnostic;
use thiserror::Error;

use crate::filesystem::{
    MountProvider, StagingDir, clean_path, place_symlink, plan_symlinks, unique_dir,
};

/// A copy-up run that stopped part way.
#[derive(Error, Diagnostic, Debug)]
#[error("Copy-up aborted after {} director{}", copied.len(), if copied.len() == 1 { "y" } else { "ies" })]
#[diagnostic(code(copyup::aborted))]
pub struct CopyUpFailure {
    /// Directories fully copied up before the failure.
    pub copied: Vec<PathBuf>,
    /// What went wrong.
    #[source]
    pub error: CopyUpError,
}

impl CopyUpFailure {
    fn nothing_copied(error: CopyUpError) -> Self {
        Self {
            copied: Vec::new(),
            error,
        }
    }
}

/// Strategy that makes directories writable without copying their content.
pub trait CopyUpDriver {
    /// Copy up `dirs` in order, returning the cleaned paths processed.
    fn copy_up<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<Vec<PathBuf>, CopyUpFailure>;
}

/// Copy-up driver layering tmpfs over each directory and linking the
/// original entries back in through a hidden shadow bind mount.
#[derive(Debug, Clone)]
pub struct TmpfsSymlinkDriver<M> {
    mounts: M,
    paths: CopyUpPaths,
    staging_prefix: String,
    shadow_prefix: String,
    exclusions: ExclusionSet,
}

impl<M: MountProvider> TmpfsSymlinkDriver<M> {
    /// Create a driver with default settings and no exclusions.
    pub fn new(mounts: M) -> Self {
        Self::from_config(mounts, &CopyUpConfig::default())
    }

    /// Create a driver that leaves `excluded` destinations absent.
    pub fn with_exclusions<I, P>(mounts: M, excluded: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut driver = Self::new(mounts);
        driver.exclusions.extend(excluded);
        driver
    }

    /// Create a driver from a configuration.
    ///
    /// A relative staging root is resolved against the current directory, so
    /// the reserved-path check compares absolute paths.
    pub fn from_config(mounts: M, config: &CopyUpConfig) -> Self {
        let staging_root = std::path::absolute(&config.staging_root)
            .unwrap_or_else(|_| config.staging_root.clone());
        Self {
            mounts,
            paths: CopyUpPaths::with_staging_root(clean_path(&staging_root)),
            staging_prefix: config.staging_prefix.clone(),
            shadow_prefix: config.shadow_prefix.clone(),
            exclusions: config.exclude.iter().cloned().collect(),
        }
    }

    /// Mount provider in use.
    pub fn mounts(&self) -> &M {
        &self.mounts
    }

    /// Reserved locations of this driver.
    pub fn paths(&self) -> &CopyUpPaths {
        &self.paths
    }

    /// Excluded destinations.
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Clean every target and reject those that cannot be copied up.
    fn validate<P: AsRef<Path>>(&self, dirs: &[P]) -> CopyUpResult<Vec<PathBuf>> {
        let root = &self.paths.staging_root;
        if !root.is_absolute() {
            return Err(CopyUpError::Allocation {
                root: root.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "staging root could not be made absolute",
                ),
            });
        }

        dirs.iter()
            .map(|dir| {
                let dir = clean_path(dir.as_ref());
                if !dir.is_absolute() {
                    return Err(CopyUpError::NotAbsolute { path: dir });
                }
                if self.paths.is_reserved(&dir) {
                    return Err(CopyUpError::ReservedPath {
                        path: dir,
                        root: root.clone(),
                    });
                }
                Ok(dir)
            })
            .collect()
    }

    fn copy_up_dir(&self, dir: &Path, staging: &Path) -> CopyUpResult<usize> {
        let mount_error = |step: MountStep| {
            move |source: io::Error| CopyUpError::Mount {
                step,
                path: dir.to_path_buf(),
                source,
            }
        };

        self.mounts
            .bind_recursive(dir, staging)
            .map_err(mount_error(MountStep::Bind))?;

        self.mounts
            .mount_tmpfs(dir)
            .map_err(mount_error(MountStep::Tmpfs))?;

        let shadow = unique_dir(dir, &self.shadow_prefix).map_err(mount_error(MountStep::Shadow))?;

        self.mounts
            .move_mount(staging, &shadow)
            .map_err(mount_error(MountStep::Move))?;

        tracing::debug!(shadow = %shadow.display(), "Original content relocated");

        self.link_entries(dir, &shadow)
    }

    /// Replace every top-level entry of `shadow` with a symlink in `dir`.
    fn link_entries(&self, dir: &Path, shadow: &Path) -> CopyUpResult<usize> {
        let mut linked = 0;
        for entry in plan_symlinks(dir, shadow)? {
            if self.exclusions.is_excluded(&entry.destination) {
                tracing::debug!(path = %entry.destination.display(), "Skipping excluded entry");
                continue;
            }
            place_symlink(&entry)?;
            linked += 1;
        }
        Ok(linked)
    }
}

impl<M: MountProvider> CopyUpDriver for TmpfsSymlinkDriver<M> {
    fn copy_up<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<Vec<PathBuf>, CopyUpFailure> {
        let targets = self.validate(dirs).map_err(CopyUpFailure::nothing_copied)?;
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!(
            count = targets.len(),
            excluded = self.exclusions.len(),
            "Copying up directories"
        );

        let staging = StagingDir::allocate(&self.paths.staging_root, &self.staging_prefix)
            .map_err(CopyUpFailure::nothing_copied)?;

        let mut copied = Vec::with_capacity(targets.len());
        for dir in targets {
            let span = tracing::info_span!("copy_up", dir = %dir.display());
            let _enter = span.enter();

            match self.copy_up_dir(&dir, staging.path()) {
                Ok(linked) => {
                    tracing::info!(linked, "Directory copied up");
                    copied.push(dir);
                }
                Err(error) => {
                    tracing::error!(error = %error, stage = error.stage(), "Copy-up failed");
                    return Err(CopyUpFailure { copied, error });
                }
            }
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MountCall, MountOp, SimulatedMounts};
    use copyup_common::SymlinkStep;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn driver_in(root: &Path) -> TmpfsSymlinkDriver<SimulatedMounts> {
        let config = CopyUpConfig::default().with_staging_root(root);
        TmpfsSymlinkDriver::from_config(SimulatedMounts::new(), &config)
    }

    #[test]
    fn empty_list_does_nothing() {
        let root = tempdir().unwrap();
        let driver = driver_in(root.path());

        let copied = driver.copy_up::<PathBuf>(&[]).unwrap();
        assert!(copied.is_empty());
        assert!(driver.mounts().calls().is_empty());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn staging_root_is_rejected_before_mounting() {
        let root = tempdir().unwrap();
        let driver = driver_in(root.path());

        let failure = driver.copy_up(&[root.path().to_path_buf()]).unwrap_err();
        assert!(failure.copied.is_empty());
        assert!(matches!(failure.error, CopyUpError::ReservedPath { .. }));
        assert!(driver.mounts().calls().is_empty());
    }

    #[test]
    fn default_staging_root_tmp_is_rejected() {
        let config = CopyUpConfig::default().with_staging_root("/tmp");
        let driver = TmpfsSymlinkDriver::from_config(SimulatedMounts::new(), &config);

        for dir in ["/tmp", "/tmp/", "/", "/etc/../tmp"] {
            let failure = driver.copy_up(&[PathBuf::from(dir)]).unwrap_err();
            assert!(failure.copied.is_empty());
            assert!(
                matches!(failure.error, CopyUpError::ReservedPath { .. }),
                "{dir} should be reserved"
            );
        }
        assert!(driver.mounts().calls().is_empty());
    }

    #[test]
    fn relative_targets_are_rejected() {
        let root = tempdir().unwrap();
        let driver = driver_in(root.path());

        let failure = driver.copy_up(&["etc"]).unwrap_err();
        assert!(matches!(failure.error, CopyUpError::NotAbsolute { .. }));
    }

    #[test]
    fn relative_staging_root_is_resolved_before_checking() {
        let cwd = std::env::current_dir().unwrap();
        let config = CopyUpConfig::default().with_staging_root("stage");
        let driver = TmpfsSymlinkDriver::from_config(SimulatedMounts::new(), &config);
        assert_eq!(driver.paths().staging_root, cwd.join("stage"));

        for dir in [cwd.clone(), cwd.join("stage")] {
            let failure = driver.copy_up(&[&dir]).unwrap_err();
            assert!(failure.copied.is_empty());
            assert!(
                matches!(failure.error, CopyUpError::ReservedPath { .. }),
                "{} should be reserved",
                dir.display()
            );
        }
        assert!(driver.mounts().calls().is_empty());
    }

    #[test]
    fn steps_run_in_order() {
        let root = tempdir().unwrap();
        let staging_root = root.path().join("staging");
        let target = root.path().join("etc");
        fs::create_dir_all(&staging_root).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("hosts"), "127.0.0.1 localhost\n").unwrap();

        let driver = driver_in(&staging_root);
        let copied = driver.copy_up(&[target.clone()]).unwrap();
        assert_eq!(copied, vec![target.clone()]);

        let calls = driver.mounts().calls();
        assert_eq!(calls.len(), 3);
        let MountCall::BindRecursive { source, target: staging } = &calls[0] else {
            panic!("expected bind first, got {calls:?}");
        };
        assert_eq!(source, &target);
        assert!(staging.starts_with(&staging_root));
        assert_eq!(calls[1], MountCall::Tmpfs { target: target.clone() });
        let MountCall::Move { source, target: shadow } = &calls[2] else {
            panic!("expected move last, got {calls:?}");
        };
        assert_eq!(source, staging);
        assert_eq!(shadow.parent(), Some(target.as_path()));

        // staging directory removed once the run ends
        assert_eq!(fs::read_dir(&staging_root).unwrap().count(), 0);
    }

    #[test]
    fn failure_keeps_completed_prefix() {
        let root = tempdir().unwrap();
        let staging_root = root.path().join("staging");
        let first = root.path().join("etc");
        let second = root.path().join("run");
        fs::create_dir_all(&staging_root).unwrap();
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("hostname"), "box\n").unwrap();

        let config = CopyUpConfig::default().with_staging_root(&staging_root);
        let mounts = SimulatedMounts::new().fail_tmpfs_on(&second);
        let driver = TmpfsSymlinkDriver::from_config(mounts, &config);

        let failure = driver
            .copy_up(&[first.clone(), second.clone()])
            .unwrap_err();
        assert_eq!(failure.copied, vec![first.clone()]);
        assert!(matches!(
            failure.error,
            CopyUpError::Mount {
                step: MountStep::Tmpfs,
                ref path,
                ..
            } if *path == second
        ));

        // first directory stays copied up
        let link = fs::read_link(first.join("hostname")).unwrap();
        assert!(link.to_string_lossy().starts_with(".ro"), "{link:?}");
        assert_eq!(link.file_name(), Some(std::ffi::OsStr::new("hostname")));
        assert_eq!(fs::read_to_string(first.join("hostname")).unwrap(), "box\n");
    }

    /// Two populated directories next to a staging root.
    struct TwoDirs {
        _root: tempfile::TempDir,
        staging_root: PathBuf,
        first: PathBuf,
        second: PathBuf,
    }

    impl TwoDirs {
        fn new() -> Self {
            let root = tempdir().unwrap();
            let staging_root = root.path().join("staging");
            let first = root.path().join("etc");
            let second = root.path().join("run");
            for dir in [&staging_root, &first, &second] {
                fs::create_dir_all(dir).unwrap();
            }
            fs::write(first.join("hostname"), "box\n").unwrap();
            fs::write(second.join("utmp"), "").unwrap();
            Self {
                _root: root,
                staging_root,
                first,
                second,
            }
        }

        fn copy_up(&self, mounts: SimulatedMounts) -> CopyUpFailure {
            let config = CopyUpConfig::default().with_staging_root(&self.staging_root);
            TmpfsSymlinkDriver::from_config(mounts, &config)
                .copy_up(&[&self.first, &self.second])
                .unwrap_err()
        }
    }

    #[test]
    fn bind_failure_keeps_completed_prefix() {
        let dirs = TwoDirs::new();
        let failure = dirs.copy_up(SimulatedMounts::new().fail_on(MountOp::Bind, &dirs.second));

        assert_eq!(failure.copied, vec![dirs.first.clone()]);
        assert!(matches!(
            failure.error,
            CopyUpError::Mount { step: MountStep::Bind, .. }
        ));
        assert_eq!(failure.error.stage(), "bind mount");
        assert_eq!(failure.error.path(), dirs.second);
        // nothing was bound, so the staging directory is gone
        assert_eq!(fs::read_dir(&dirs.staging_root).unwrap().count(), 0);
    }

    #[test]
    fn shadow_failure_keeps_completed_prefix() {
        let dirs = TwoDirs::new();
        let failure =
            dirs.copy_up(SimulatedMounts::new().vanish_after(MountOp::Tmpfs, &dirs.second));

        assert_eq!(failure.copied, vec![dirs.first.clone()]);
        assert!(matches!(
            failure.error,
            CopyUpError::Mount { step: MountStep::Shadow, .. }
        ));
        assert_eq!(failure.error.stage(), "relocation");
    }

    #[test]
    fn enumeration_failure_keeps_completed_prefix() {
        let dirs = TwoDirs::new();
        let failure =
            dirs.copy_up(SimulatedMounts::new().vanish_after(MountOp::Move, &dirs.second));

        assert_eq!(failure.copied, vec![dirs.first.clone()]);
        assert!(matches!(failure.error, CopyUpError::Enumeration { .. }));
        assert_eq!(failure.error.stage(), "enumeration");
        assert!(failure.error.path().starts_with(&dirs.second));
    }

    #[test]
    fn symlink_failure_keeps_completed_prefix() {
        if rustix::process::geteuid().is_root() {
            eprintln!("skipping: root ignores directory permissions");
            return;
        }

        let dirs = TwoDirs::new();
        let failure = dirs.copy_up(SimulatedMounts::new().read_only_after_move(&dirs.second));
        fs::set_permissions(&dirs.second, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(failure.copied, vec![dirs.first.clone()]);
        assert!(matches!(
            failure.error,
            CopyUpError::Symlink { step: SymlinkStep::Create, .. }
        ));
        assert_eq!(failure.error.stage(), "symlink creation");
        assert_eq!(failure.error.path(), dirs.second.join("utmp"));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let root = tempdir().unwrap();
        let target = root.path().join("etc");
        fs::create_dir_all(&target).unwrap();

        let driver = driver_in(&root.path().join("missing"));
        let failure = driver.copy_up(&[target]).unwrap_err();
        assert!(failure.copied.is_empty());
        assert!(matches!(failure.error, CopyUpError::Allocation { .. }));
        assert!(driver.mounts().calls().is_empty());
    }

    #[test]
    fn failure_message_counts_directories() {
        let failure = CopyUpFailure {
            copied: vec![PathBuf::from("/etc")],
            error: CopyUpError::NotAbsolute {
                path: PathBuf::from("run"),
            },
        };
        insta::assert_snapshot!(failure.to_string(), @"Copy-up aborted after 1 directory");
    }
}

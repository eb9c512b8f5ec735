//! Unprivileged stand-in for the kernel mount table.
//!
//! [`SimulatedMounts`] lets a copy-up run execute inside an ordinary scratch
//! tree. Mount effects are emulated with renames, so every directory involved
//! must live on the same filesystem (a single `tempfile::tempdir` works).
//!
//! - a recursive bind only records which directory the staging dir exposes
//! - a tmpfs mount hands the target's entries to the staging dir bound to it,
//!   leaving the target empty
//! - a move hands the staging dir's entries to the move target

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::filesystem::{MountProvider, unique_dir};

/// One mount operation issued to a [`SimulatedMounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    /// `bind_recursive(source, target)`.
    BindRecursive {
        /// Directory being bound.
        source: PathBuf,
        /// Bind destination.
        target: PathBuf,
    },
    /// `mount_tmpfs(target)`.
    Tmpfs {
        /// Directory covered by tmpfs.
        target: PathBuf,
    },
    /// `move_mount(source, target)`.
    Move {
        /// Mount point being moved.
        source: PathBuf,
        /// New mount point.
        target: PathBuf,
    },
}

/// Mount operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOp {
    /// Recursive bind of the directory.
    Bind,
    /// tmpfs over the directory.
    Tmpfs,
    /// Move into the directory's shadow.
    Move,
}

/// Mount provider emulating mounts with renames, recording every call.
#[derive(Debug, Default)]
pub struct SimulatedMounts {
    calls: RefCell<Vec<MountCall>>,
    // staging dir -> directory it exposes
    bindings: RefCell<HashMap<PathBuf, PathBuf>>,
    failures: Vec<(MountOp, PathBuf)>,
    vanishing: Vec<(MountOp, PathBuf)>,
    read_only: Vec<PathBuf>,
    stray_files: Vec<OsString>,
}

impl SimulatedMounts {
    /// Create a provider that succeeds at everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `op` with `EPERM` while `dir` is being copied up.
    #[must_use]
    pub fn fail_on(mut self, op: MountOp, dir: impl Into<PathBuf>) -> Self {
        self.failures.push((op, dir.into()));
        self
    }

    /// Fail the tmpfs mount over `dir`.
    #[must_use]
    pub fn fail_tmpfs_on(self, dir: impl Into<PathBuf>) -> Self {
        self.fail_on(MountOp::Tmpfs, dir)
    }

    /// Let `op` succeed for `dir`, then delete the directory it produced:
    /// the target itself after a tmpfs, the shadow after a move.
    #[must_use]
    pub fn vanish_after(mut self, op: MountOp, dir: impl Into<PathBuf>) -> Self {
        self.vanishing.push((op, dir.into()));
        self
    }

    /// Drop write permission on `dir` once its shadow is in place, like a
    /// tmpfs remounted read-only. Has no effect on a process running as root.
    #[must_use]
    pub fn read_only_after_move(mut self, dir: impl Into<PathBuf>) -> Self {
        self.read_only.push(dir.into());
        self
    }

    /// Leave an empty file called `name` in every fresh tmpfs, the way
    /// `mount` drops an `mtab` into a bare `/etc`.
    #[must_use]
    pub fn leave_behind(mut self, name: impl Into<OsString>) -> Self {
        self.stray_files.push(name.into());
        self
    }

    /// Calls issued so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<MountCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: MountCall) {
        self.calls.borrow_mut().push(call);
    }

    fn check(&self, op: MountOp, dir: &Path) -> io::Result<()> {
        if self.failures.iter().any(|(o, d)| *o == op && d == dir) {
            return Err(rustix::io::Errno::PERM.into());
        }
        Ok(())
    }

    fn vanishes(&self, op: MountOp, dir: &Path) -> bool {
        self.vanishing.iter().any(|(o, d)| *o == op && d == dir)
    }
}

impl MountProvider for SimulatedMounts {
    fn bind_recursive(&self, source: &Path, target: &Path) -> io::Result<()> {
        self.record(MountCall::BindRecursive {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        });
        self.check(MountOp::Bind, source)?;
        require_dir(source)?;
        require_dir(target)?;

        self.bindings
            .borrow_mut()
            .insert(target.to_path_buf(), source.to_path_buf());
        Ok(())
    }

    fn mount_tmpfs(&self, target: &Path) -> io::Result<()> {
        self.record(MountCall::Tmpfs {
            target: target.to_path_buf(),
        });
        self.check(MountOp::Tmpfs, target)?;
        require_dir(target)?;

        let holder = self
            .bindings
            .borrow()
            .iter()
            .find(|(_, exposed)| exposed.as_path() == target)
            .map(|(staging, _)| staging.clone());
        let holder = match holder {
            Some(staging) => staging,
            None => hidden_sibling(target)?,
        };
        move_entries(target, &holder)?;

        for name in &self.stray_files {
            fs::write(target.join(name), "")?;
        }

        if self.vanishes(MountOp::Tmpfs, target) {
            fs::remove_dir_all(target)?;
        }
        Ok(())
    }

    fn move_mount(&self, source: &Path, target: &Path) -> io::Result<()> {
        self.record(MountCall::Move {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        });
        let dir = target.parent().unwrap_or(target);
        self.check(MountOp::Move, dir)?;
        require_dir(target)?;

        if self.bindings.borrow_mut().remove(source).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a mount point", source.display()),
            ));
        }
        move_entries(source, target)?;

        if self.vanishes(MountOp::Move, dir) {
            fs::remove_dir_all(target)?;
        }
        if self.read_only.iter().any(|d| d == dir) {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o555))?;
        }
        Ok(())
    }
}

fn require_dir(path: &Path) -> io::Result<()> {
    if fs::metadata(path)?.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{} is not a directory", path.display()),
        ))
    }
}

/// Directory next to `dir` that takes over content hidden by an unbound tmpfs.
fn hidden_sibling(dir: &Path) -> io::Result<PathBuf> {
    let parent = dir.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "cannot cover the root directory")
    })?;
    unique_dir(parent, ".hidden")
}

fn move_entries(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        fs::rename(entry.path(), to.join(entry.file_name()))?;
    }
    Ok(())
}

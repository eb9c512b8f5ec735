//! Mount operations.

use std::io;
use std::path::Path;

/// Mount table operations a copy-up run is built from.
///
/// [`HostMounts`] issues the real syscalls. [`crate::testing::SimulatedMounts`]
/// emulates them inside a scratch tree where mounting is not permitted.
pub trait MountProvider {
    /// Recursively bind `source` onto `target` (`MS_BIND | MS_REC`).
    fn bind_recursive(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Mount a fresh, empty tmpfs over `target`.
    fn mount_tmpfs(&self, target: &Path) -> io::Result<()>;

    /// Move the mount at `source` onto `target` (`MS_MOVE`).
    fn move_mount(&self, source: &Path, target: &Path) -> io::Result<()>;
}

impl<T: MountProvider + ?Sized> MountProvider for &T {
    fn bind_recursive(&self, source: &Path, target: &Path) -> io::Result<()> {
        (**self).bind_recursive(source, target)
    }

    fn mount_tmpfs(&self, target: &Path) -> io::Result<()> {
        (**self).mount_tmpfs(target)
    }

    fn move_mount(&self, source: &Path, target: &Path) -> io::Result<()> {
        (**self).move_mount(source, target)
    }
}

/// Mount provider backed by the kernel mount table of the calling process.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostMounts;

#[cfg(target_os = "linux")]
impl MountProvider for HostMounts {
    fn bind_recursive(&self, source: &Path, target: &Path) -> io::Result<()> {
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "Creating recursive bind mount"
        );

        rustix::mount::mount_bind_recursive(source, target)?;
        Ok(())
    }

    fn mount_tmpfs(&self, target: &Path) -> io::Result<()> {
        use rustix::mount::{MountFlags, mount};

        tracing::debug!(target = %target.display(), "Mounting tmpfs");

        mount(Path::new("none"), target, c"tmpfs", MountFlags::empty(), c"")?;
        Ok(())
    }

    fn move_mount(&self, source: &Path, target: &Path) -> io::Result<()> {
        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            "Moving mount point"
        );

        rustix::mount::mount_move(source, target)?;
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl MountProvider for HostMounts {
    fn bind_recursive(&self, _source: &Path, _target: &Path) -> io::Result<()> {
        Err(unsupported("bind mounts"))
    }

    fn mount_tmpfs(&self, _target: &Path) -> io::Result<()> {
        Err(unsupported("tmpfs"))
    }

    fn move_mount(&self, _source: &Path, _target: &Path) -> io::Result<()> {
        Err(unsupported("move mounts"))
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported(feature: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{feature} require Linux"),
    )
}

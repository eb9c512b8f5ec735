//! # copyup
//!
//! Makes directories writable inside a private mount namespace without copying
//! any data. Each target directory gets an empty tmpfs mounted over it, the
//! original content is re-attached underneath as a hidden bind mount, and every
//! top-level entry is recreated as a symlink into that hidden tree.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use copyup::driver::{CopyUpDriver, TmpfsSymlinkDriver};
//! use copyup::filesystem::HostMounts;
//!
//! # fn example() -> Result<(), copyup::driver::CopyUpFailure> {
//! let driver = TmpfsSymlinkDriver::with_exclusions(
//!     HostMounts,
//!     ["/etc/apparmor", "/etc/apparmor.d"],
//! );
//! let copied = driver.copy_up(&[PathBuf::from("/etc"), PathBuf::from("/run")])?;
//! assert_eq!(copied.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod driver;
pub mod filesystem;
pub mod testing;

pub use driver::{CopyUpConfig, CopyUpDriver, CopyUpFailure, TmpfsSymlinkDriver};

//! Filesystem operations behind a copy-up run.
//!
//! This module handles:
//! - Mount table operations (recursive bind, tmpfs, move)
//! - The staging directory and randomized shadow directories
//! - Symlink planning and placement
//! - Lexical path cleaning

mod mounts;
mod path;
mod staging;
mod symlinks;

pub use mounts::{HostMounts, MountProvider};
pub use path::clean_path;
pub use staging::{StagingDir, unique_dir};
pub use symlinks::{SymlinkEntry, place_symlink, plan_symlinks};

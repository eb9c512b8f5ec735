//! # copyup-common
//!
//! Shared types for the copyup driver:
//! - Error kinds for every stage of a copy-up run
//! - The reserved staging root and its defaults

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{CopyUpError, CopyUpResult, MountStep, SymlinkStep};
pub use paths::CopyUpPaths;

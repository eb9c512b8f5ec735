//! Lexical path cleaning.

use std::path::{Component, Path, PathBuf};

/// Clean a path lexically, without touching the filesystem.
///
/// Repeated separators and `.` components are dropped, `..` removes the
/// preceding component (and is discarded directly under `/`), and trailing
/// separators disappear. An empty result becomes `.`.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut ret = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => match ret.components().next_back() {
                Some(Component::Normal(_)) => {
                    ret.pop();
                }
                Some(Component::RootDir | Component::Prefix(..)) => {}
                _ => ret.push(".."),
            },
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }

    if ret.as_os_str().is_empty() {
        ret.push(".");
    }
    ret
}

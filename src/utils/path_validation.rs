//! Path validation for archive entries and protected folders.
//!
//! Both archive entry names and protected folder names come from outside the
//! program, so they are checked lexically before being joined onto the install root.

use std::path::{Component, Path, PathBuf};

/// Reasons a relative path is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathViolation {
    Empty,
    Absolute,
    ParentReference,
    /// The path resolves to the base directory itself (e.g. `.` or `./`).
    SameAsBase,
}

impl std::fmt::Display for PathViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Empty => "path is empty",
            Self::Absolute => "path must be relative to the install root",
            Self::ParentReference => "path contains a parent directory reference (..)",
            Self::SameAsBase => "path refers to the install root itself",
        };
        f.write_str(msg)
    }
}

/// Normalize a relative path, rejecting anything that could leave its base.
///
/// `CurDir` components are dropped; the result always has at least one normal
/// component.
pub fn normalize_relative(path: &Path) -> Result<PathBuf, PathViolation> {
    if path.as_os_str().is_empty() {
        return Err(PathViolation::Empty);
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathViolation::ParentReference),
            Component::RootDir | Component::Prefix(_) => return Err(PathViolation::Absolute),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathViolation::SameAsBase);
    }

    Ok(normalized)
}

/// Whether `path` is `base` or lies below it, compared lexically.
pub fn is_within(base: &Path, path: &Path) -> bool {
    path.starts_with(base)
}

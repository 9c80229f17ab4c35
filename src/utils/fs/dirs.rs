//! Directory operations: create, copy, remove, and selectively wipe.

use crate::core::{LauncherError, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| LauncherError::from_io("creating directory", path, e))?;
    } else if !path.is_dir() {
        return Err(LauncherError::Io {
            operation: "creating directory".to_string(),
            path: path.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "path exists but is not a directory",
            ),
        });
    }
    Ok(())
}

/// Copy a file or a whole directory tree from `src` to `dst`.
///
/// Directories are merged into `dst`; existing files are overwritten. Symlinks are
/// skipped.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    let metadata =
        fs::symlink_metadata(src).map_err(|e| LauncherError::from_io("reading metadata", src, e))?;

    if metadata.is_file() {
        if let Some(parent) = dst.parent() {
            ensure_dir(parent)?;
        }
        return fs::copy(src, dst).map_err(|e| LauncherError::from_io("copying file", dst, e));
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            LauncherError::from_io("walking directory", &path, e.into())
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            ensure_dir(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                ensure_dir(parent)?;
            }
            copied += fs::copy(entry.path(), &target)
                .map_err(|e| LauncherError::from_io("copying file", &target, e))?;
        }
    }

    Ok(copied)
}

/// Remove a file or directory. Missing paths are not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(LauncherError::from_io("reading metadata", path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| LauncherError::from_io("removing", path, e))
}

/// Remove every direct child of `root` whose name is not kept by `keep`.
///
/// Returns the number of removed entries.
pub fn remove_dir_contents_except(root: &Path, keep: impl Fn(&OsStr) -> bool) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let entries =
        fs::read_dir(root).map_err(|e| LauncherError::from_io("reading directory", root, e))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| LauncherError::from_io("reading directory", root, e))?;
        let name = entry.file_name();
        if keep(&name) {
            debug!("Keeping {:?} in {}", name, root.display());
            continue;
        }
        remove_path(&entry.path())?;
        removed += 1;
    }

    Ok(removed)
}

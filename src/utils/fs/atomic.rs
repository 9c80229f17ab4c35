//! Atomic file write operations using temp-and-rename strategy.
//!
//! A reader never observes a half-written file: content goes to a temporary file
//! in the same directory, is synced, and then renamed over the destination.

use crate::core::{LauncherError, Result};
use crate::utils::fs::dirs::ensure_dir;
use std::io::Write;
use std::path::Path;

/// Write `content` to `path` atomically.
///
/// # Errors
///
/// Fails with `DiskFull`, `PermissionDenied`, or `Io` depending on what the
/// filesystem reported. The destination is untouched on failure.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".launchkit-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| LauncherError::from_io("creating temp file", parent, e))?;

    temp.write_all(content).map_err(|e| LauncherError::from_io("writing temp file", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| LauncherError::from_io("syncing temp file", temp.path(), e))?;

    temp.persist(path).map_err(|e| LauncherError::from_io("renaming temp file", path, e.error))?;

    Ok(())
}

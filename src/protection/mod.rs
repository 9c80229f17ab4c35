//! Preservation of user-owned folders across a destructive reinstall.
//!
//! Before the install root is wiped, every protected path that exists is copied
//! into a private quarantine directory outside the install root. After the new
//! release is extracted, the quarantined copies replace whatever the archive put
//! at those paths.
//!
//! # Safety Rules
//!
//! - The quarantine is never inside the install root, so the wipe cannot reach it
//! - A quarantine is deleted only by [`ProtectionManager::discard`], which the engine
//!   calls after a fully successful restore
//! - A failed restore leaves the quarantine on disk and reports its location
//! - Restore is idempotent: each path is staged next to its destination and then
//!   swapped in, so running it twice produces the same tree
//!
//! Every quarantine directory carries a `snapshot.json` manifest, so handles left
//! behind by a crashed or failed run can be found again with
//! [`ProtectionManager::pending_snapshots`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use launchkit::protection::{ProtectionManager, ProtectionSet};
//! use std::path::Path;
//!
//! # async fn example() -> launchkit::core::Result<()> {
//! let set = ProtectionSet::new(["minimap", "conf"])?;
//! let manager = ProtectionManager::new("/var/lib/launchkit/quarantine/client");
//! let root = Path::new("/games/client");
//!
//! let handle = manager.snapshot(root, &set).await?;
//! // ... wipe and reinstall root ...
//! manager.restore(root, &handle).await?;
//! manager.discard(handle).await?;
//! # Ok(())
//! # }
//! ```

use crate::core::{LauncherError, Result};
use crate::utils::fs::{atomic_write, copy_tree, ensure_dir, remove_path};
use crate::utils::path_validation::{is_within, normalize_relative};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "snapshot.json";
const DATA_DIR: &str = "data";

/// Ordered set of folders (relative to the install root) that survive updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionSet {
    paths: Vec<PathBuf>,
}

impl ProtectionSet {
    /// Build a set, validating every entry and dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`LauncherError::InvalidProtectedPath`] for empty, absolute, `..`,
    /// or root-equivalent (`.`) entries. Those would either escape the install
    /// root or protect all of it, which would make extraction impossible.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let raw = entry.as_ref().trim();
            let normalized = normalize_relative(Path::new(raw)).map_err(|violation| {
                LauncherError::InvalidProtectedPath {
                    path: raw.to_string(),
                    reason: violation.to_string(),
                }
            })?;
            if !paths.contains(&normalized) {
                paths.push(normalized);
            }
        }
        Ok(Self {
            paths,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether a top-level entry of the install root is itself protected.
    pub fn protects_top_level(&self, name: &OsStr) -> bool {
        self.paths.iter().any(|p| p.as_os_str() == name)
    }
}

/// Record of one snapshot: where the quarantine is and which paths it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub id: String,
    pub quarantine: PathBuf,
    pub install_root: PathBuf,
    /// Protected paths that existed at snapshot time, in set order.
    pub entries: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl SnapshotHandle {
    /// Reload a handle from a quarantine directory's manifest.
    pub fn load(quarantine: &Path) -> Result<Self> {
        let manifest = quarantine.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest)
            .map_err(|e| LauncherError::from_io("reading snapshot manifest", &manifest, e))?;
        serde_json::from_str(&content).map_err(|e| LauncherError::Io {
            operation: "parsing snapshot manifest".to_string(),
            path: manifest.display().to_string(),
            source: e.into(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn stored_path(&self, relative: &Path) -> PathBuf {
        self.quarantine.join(DATA_DIR).join(relative)
    }
}

/// Creates, restores, and discards quarantines under one quarantine root.
#[derive(Debug, Clone)]
pub struct ProtectionManager {
    quarantine_root: PathBuf,
}

impl ProtectionManager {
    pub fn new(quarantine_root: impl Into<PathBuf>) -> Self {
        Self {
            quarantine_root: quarantine_root.into(),
        }
    }

    pub fn quarantine_root(&self) -> &Path {
        &self.quarantine_root
    }

    /// Copy every existing protected path out of `install_root`.
    ///
    /// Absent paths are skipped (a fresh install has none). If copying fails the
    /// partial quarantine is removed; nothing in the install root has been touched
    /// at that point.
    pub async fn snapshot(&self, install_root: &Path, set: &ProtectionSet) -> Result<SnapshotHandle> {
        let quarantine_root = self.quarantine_root.clone();
        let install_root = install_root.to_path_buf();
        let set = set.clone();

        run_blocking(move || snapshot_blocking(&quarantine_root, &install_root, &set)).await
    }

    /// Copy every recorded path back into `install_root`, replacing what is there.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`LauncherError::ProtectionRestoreError`] naming
    /// the quarantine directory, which is left untouched.
    pub async fn restore(&self, install_root: &Path, handle: &SnapshotHandle) -> Result<()> {
        let install_root = install_root.to_path_buf();
        let handle = handle.clone();

        run_blocking(move || restore_blocking(&install_root, &handle)).await
    }

    /// Delete a quarantine after a confirmed successful restore.
    pub async fn discard(&self, handle: SnapshotHandle) -> Result<()> {
        debug!("Discarding quarantine {}", handle.quarantine.display());
        run_blocking(move || remove_path(&handle.quarantine)).await
    }

    /// Quarantines left on disk by runs that did not finish.
    pub fn pending_snapshots(&self) -> Result<Vec<SnapshotHandle>> {
        if !self.quarantine_root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.quarantine_root).map_err(|e| {
            LauncherError::from_io("reading quarantine root", &self.quarantine_root, e)
        })?;

        let mut handles = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match SnapshotHandle::load(&path) {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Ignoring unreadable quarantine {}: {}", path.display(), e),
            }
        }
        handles.sort_by_key(|h| h.created_at);
        Ok(handles)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| LauncherError::Io {
        operation: "joining blocking task".to_string(),
        path: String::new(),
        source: std::io::Error::other(e),
    })?
}

fn snapshot_blocking(
    quarantine_root: &Path,
    install_root: &Path,
    set: &ProtectionSet,
) -> Result<SnapshotHandle> {
    if is_within(install_root, quarantine_root) {
        return Err(LauncherError::InvalidConfig {
            message: format!(
                "quarantine directory {} must be outside the install root {}",
                quarantine_root.display(),
                install_root.display()
            ),
        });
    }

    let id = uuid::Uuid::new_v4().to_string();
    let quarantine = quarantine_root.join(&id);
    ensure_dir(&quarantine.join(DATA_DIR))?;

    let mut handle = SnapshotHandle {
        id,
        quarantine: quarantine.clone(),
        install_root: install_root.to_path_buf(),
        entries: Vec::new(),
        created_at: Utc::now(),
    };

    let result = (|| {
        for relative in set.paths() {
            let source = install_root.join(relative);
            if fs::symlink_metadata(&source).is_err() {
                debug!("Protected path {} not present, skipping", relative.display());
                continue;
            }
            let bytes = copy_tree(&source, &handle.stored_path(relative))?;
            debug!("Quarantined {} ({} bytes)", relative.display(), bytes);
            handle.entries.push(relative.clone());
        }
        write_manifest(&handle)
    })();

    if let Err(e) = result {
        warn!("Snapshot failed, removing partial quarantine {}", quarantine.display());
        if let Err(cleanup) = remove_path(&quarantine) {
            warn!("Failed to remove partial quarantine: {}", cleanup);
        }
        return Err(e);
    }

    info!(
        "Snapshot {} holds {} protected path(s) from {}",
        handle.id,
        handle.entries.len(),
        install_root.display()
    );
    Ok(handle)
}

fn write_manifest(handle: &SnapshotHandle) -> Result<()> {
    let manifest = handle.quarantine.join(MANIFEST_FILE);
    let content = serde_json::to_vec_pretty(handle).map_err(|e| LauncherError::Io {
        operation: "serializing snapshot manifest".to_string(),
        path: manifest.display().to_string(),
        source: e.into(),
    })?;
    atomic_write(&manifest, &content)
}

fn restore_blocking(install_root: &Path, handle: &SnapshotHandle) -> Result<()> {
    let fail = |reason: String| LauncherError::ProtectionRestoreError {
        quarantine: handle.quarantine.display().to_string(),
        reason,
    };

    for relative in &handle.entries {
        let stored = handle.stored_path(relative);
        if fs::symlink_metadata(&stored).is_err() {
            return Err(fail(format!("quarantined copy of {} is missing", relative.display())));
        }

        let dest = install_root.join(relative);
        let staging = staging_path(&dest);

        // Stage next to the destination so the final swap is a same-volume rename.
        remove_path(&staging).map_err(|e| fail(e.to_string()))?;
        copy_tree(&stored, &staging).map_err(|e| fail(e.to_string()))?;
        remove_path(&dest).map_err(|e| fail(e.to_string()))?;
        fs::rename(&staging, &dest)
            .map_err(|e| fail(format!("moving {} into place: {e}", relative.display())))?;

        debug!("Restored {}", relative.display());
    }

    info!("Restored {} protected path(s) into {}", handle.entries.len(), install_root.display());
    Ok(())
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    dest.with_file_name(format!(".{name}.launchkit-restore"))
}

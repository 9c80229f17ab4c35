//! Archive installation into the install root.
//!
//! Client releases are monolithic zip archives with no stable file identity across
//! versions, so installation is destroy-then-rebuild rather than an in-place merge:
//!
//! 1. **Plan**: open the archive and validate every entry against path traversal.
//!    Nothing on disk is touched until the whole archive has been enumerated, so an
//!    unreadable or malicious archive leaves the current install intact.
//! 2. **Wipe**: remove every top-level entry of the install root except protected
//!    folders (their quarantined copies are restored afterwards anyway).
//! 3. **Extract**: write every entry below the install root.
//! 4. **Verify**: every file entry must exist on disk with its declared size.
//!
//! All filesystem work runs on the blocking thread pool.

use crate::core::{LauncherError, Result};
use crate::protection::ProtectionSet;
use crate::utils::fs::{ensure_dir, remove_dir_contents_except};
use crate::utils::path_validation::normalize_relative;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Summary of one installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    /// Top-level entries removed from the previous install.
    pub removed: usize,
    /// Symlink entries that were not extracted.
    pub skipped: usize,
}

#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    path: PathBuf,
    kind: EntryKind,
    size: u64,
    #[cfg_attr(not(unix), allow(dead_code))]
    unix_mode: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Extracts zip archives into an install root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveInstaller;

impl ArchiveInstaller {
    pub fn new() -> Self {
        Self
    }

    /// Replace the contents of `root` with the contents of `archive`.
    ///
    /// # Errors
    ///
    /// - [`LauncherError::CorruptArchive`]: the archive cannot be opened or read, an
    ///   entry escapes the install root, or an extracted file has the wrong size
    /// - [`LauncherError::DiskFull`] / [`LauncherError::PermissionDenied`]: from the filesystem
    pub async fn install(
        &self,
        archive: &Path,
        root: &Path,
        protected: &ProtectionSet,
    ) -> Result<InstallReport> {
        let archive = archive.to_path_buf();
        let root = root.to_path_buf();
        let protected = protected.clone();

        tokio::task::spawn_blocking(move || install_blocking(&archive, &root, &protected))
            .await
            .map_err(|e| LauncherError::Io {
                operation: "joining extraction task".to_string(),
                path: String::new(),
                source: io::Error::other(e),
            })?
    }
}

fn corrupt(archive: &Path, reason: impl std::fmt::Display) -> LauncherError {
    LauncherError::CorruptArchive {
        path: archive.display().to_string(),
        reason: reason.to_string(),
    }
}

fn install_blocking(archive_path: &Path, root: &Path, protected: &ProtectionSet) -> Result<InstallReport> {
    let file = File::open(archive_path)
        .map_err(|e| LauncherError::from_io("opening archive", archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(archive_path, e))?;

    let plan = plan_entries(&mut archive, archive_path)?;
    if plan.iter().all(|e| e.kind != EntryKind::File) {
        return Err(corrupt(archive_path, "archive contains no files"));
    }
    debug!("Archive {} has {} entries", archive_path.display(), plan.len());

    ensure_dir(root)?;
    let removed = remove_dir_contents_except(root, |name| protected.protects_top_level(name))?;
    debug!("Removed {} entries from {}", removed, root.display());

    let mut report = InstallReport {
        removed,
        ..InstallReport::default()
    };

    for entry in &plan {
        let target = root.join(&entry.path);
        match entry.kind {
            EntryKind::Symlink => {
                warn!("Skipping symlink entry {}", entry.path.display());
                report.skipped += 1;
                continue;
            }
            EntryKind::Directory => {
                ensure_dir(&target)?;
                report.directories += 1;
            }
            EntryKind::File => {
                if let Some(parent) = target.parent() {
                    ensure_dir(parent)?;
                }
                report.bytes += extract_file(&mut archive, archive_path, entry, &target)?;
                report.files += 1;
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode {
                // Keep the owner able to replace the tree on the next update.
                let floor = if entry.kind == EntryKind::Directory { 0o700 } else { 0o600 };
                let mode = (mode & 0o7777) | floor;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                    .map_err(|e| LauncherError::from_io("setting permissions", &target, e))?;
            }
        }
    }

    verify(&plan, root, archive_path)?;

    info!(
        "Installed {} files ({} bytes) into {}",
        report.files,
        report.bytes,
        root.display()
    );
    Ok(report)
}

/// Enumerate every entry and reject anything that would land outside the root.
fn plan_entries(archive: &mut ZipArchive<File>, archive_path: &Path) -> Result<Vec<PlannedEntry>> {
    let mut plan = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| corrupt(archive_path, e))?;
        let name = entry.name().to_string();

        let enclosed = entry.enclosed_name().ok_or_else(|| {
            corrupt(archive_path, format!("entry '{name}' would extract outside the install root"))
        })?;
        let path = match normalize_relative(&enclosed) {
            Ok(path) => path,
            // A bare "./" entry names the root itself
            Err(_) if entry.is_dir() => continue,
            Err(violation) => {
                return Err(corrupt(archive_path, format!("entry '{name}': {violation}")));
            }
        };

        let kind = if entry.is_symlink() {
            EntryKind::Symlink
        } else if entry.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        plan.push(PlannedEntry {
            index,
            path,
            kind,
            size: entry.size(),
            unix_mode: entry.unix_mode(),
        });
    }

    Ok(plan)
}

fn extract_file(
    archive: &mut ZipArchive<File>,
    archive_path: &Path,
    entry: &PlannedEntry,
    target: &Path,
) -> Result<u64> {
    let mut source = archive.by_index(entry.index).map_err(|e| corrupt(archive_path, e))?;
    let mut out =
        File::create(target).map_err(|e| LauncherError::from_io("creating file", target, e))?;

    io::copy(&mut source, &mut out).map_err(|e| match e.kind() {
        // Decompression and CRC failures surface as InvalidData from the reader
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            corrupt(archive_path, format!("{}: {e}", entry.path.display()))
        }
        _ => LauncherError::from_io("extracting file", target, e),
    })
}

fn verify(plan: &[PlannedEntry], root: &Path, archive_path: &Path) -> Result<()> {
    for entry in plan.iter().filter(|e| e.kind == EntryKind::File) {
        let target = root.join(&entry.path);
        let actual = fs::metadata(&target).map(|m| m.len()).map_err(|_| {
            corrupt(archive_path, format!("{} missing after extraction", entry.path.display()))
        })?;
        if actual != entry.size {
            return Err(corrupt(
                archive_path,
                format!(
                    "{} has {} bytes after extraction, expected {}",
                    entry.path.display(),
                    actual,
                    entry.size
                ),
            ));
        }
    }
    Ok(())
}

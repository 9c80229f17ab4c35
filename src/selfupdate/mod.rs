//! Replacement of the running launcher executable.
//!
//! The running binary cannot be overwritten in place on every platform, but it can
//! be renamed. Replacement therefore goes:
//!
//! 1. stage the new binary next to the executable (`.<name>.new`)
//! 2. rename the executable to `<name>.old`
//! 3. rename the staged binary onto the executable path
//!
//! If step 3 fails the old binary is renamed back, so the launcher is never left
//! without an executable. The `.old` file is removed on the next start by
//! [`SelfReplacer::cleanup_old`].

use crate::core::{LauncherError, Result};
use crate::utils::fs::remove_path;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Swaps the launcher executable for a downloaded release.
#[derive(Debug, Clone)]
pub struct SelfReplacer {
    exe_path: PathBuf,
    old_path: PathBuf,
    staged_path: PathBuf,
}

impl SelfReplacer {
    pub fn new(exe_path: impl Into<PathBuf>) -> Self {
        let exe_path = exe_path.into();
        let name = exe_path.file_name().unwrap_or_default().to_string_lossy().into_owned();
        Self {
            old_path: exe_path.with_file_name(format!("{name}.old")),
            staged_path: exe_path.with_file_name(format!(".{name}.new")),
            exe_path,
        }
    }

    pub fn exe_path(&self) -> &Path {
        &self.exe_path
    }

    pub fn old_path(&self) -> &Path {
        &self.old_path
    }

    /// Put the binary from `download` (raw executable or a zip holding it) next to
    /// the executable, ready for [`replace`](Self::replace).
    pub async fn stage(&self, download: &Path) -> Result<PathBuf> {
        let this = self.clone();
        let download = download.to_path_buf();
        run_blocking(move || this.stage_blocking(&download)).await
    }

    /// Swap the staged binary in, rolling back on failure.
    pub async fn replace(&self, staged: &Path) -> Result<()> {
        let this = self.clone();
        let staged = staged.to_path_buf();
        run_blocking(move || this.replace_blocking(&staged)).await
    }

    /// Remove a `.old` binary left by a previous update.
    pub fn cleanup_old(&self) {
        if self.old_path.exists() {
            match remove_path(&self.old_path) {
                Ok(()) => debug!("Removed previous launcher {}", self.old_path.display()),
                // Still running on some platforms; retry next start.
                Err(e) => warn!("Could not remove {}: {}", self.old_path.display(), e),
            }
        }
    }

    fn stage_blocking(&self, download: &Path) -> Result<PathBuf> {
        remove_path(&self.staged_path)?;

        if is_zip(download)? {
            self.extract_binary(download)?;
        } else {
            fs::copy(download, &self.staged_path)
                .map_err(|e| LauncherError::from_io("staging launcher binary", &self.staged_path, e))?;
        }

        let len = fs::metadata(&self.staged_path)
            .map_err(|e| LauncherError::from_io("reading staged binary", &self.staged_path, e))?
            .len();
        if len == 0 {
            remove_path(&self.staged_path)?;
            return Err(LauncherError::CorruptArchive {
                path: download.display().to_string(),
                reason: "launcher binary is empty".to_string(),
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.staged_path, fs::Permissions::from_mode(0o755))
                .map_err(|e| LauncherError::from_io("setting permissions", &self.staged_path, e))?;
        }

        debug!("Staged new launcher at {}", self.staged_path.display());
        Ok(self.staged_path.clone())
    }

    fn extract_binary(&self, archive_path: &Path) -> Result<()> {
        let corrupt = |reason: String| LauncherError::CorruptArchive {
            path: archive_path.display().to_string(),
            reason,
        };

        let file = File::open(archive_path)
            .map_err(|e| LauncherError::from_io("opening launcher archive", archive_path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

        let exe_name = self.exe_path.file_name().unwrap_or_default().to_string_lossy().into_owned();
        let mut files = Vec::new();
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(|e| corrupt(e.to_string()))?;
            if entry.is_file()
                && let Some(name) = entry.enclosed_name()
            {
                files.push((index, name));
            }
        }

        let index = files
            .iter()
            .find(|(_, name)| name.file_name().is_some_and(|n| n.to_string_lossy() == exe_name))
            .or_else(|| (files.len() == 1).then(|| &files[0]))
            .map(|(index, _)| *index)
            .ok_or_else(|| corrupt(format!("no '{exe_name}' binary in launcher archive")))?;

        let mut entry = archive.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        let mut out = File::create(&self.staged_path)
            .map_err(|e| LauncherError::from_io("staging launcher binary", &self.staged_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => corrupt(e.to_string()),
            _ => LauncherError::from_io("staging launcher binary", &self.staged_path, e),
        })?;
        Ok(())
    }

    fn replace_blocking(&self, staged: &Path) -> Result<()> {
        remove_path(&self.old_path)?;

        let had_exe = self.exe_path.exists();
        if had_exe {
            fs::rename(&self.exe_path, &self.old_path).map_err(|e| {
                LauncherError::from_io("moving current launcher aside", &self.exe_path, e)
            })?;
        }

        if let Err(e) = fs::rename(staged, &self.exe_path) {
            warn!("Installing new launcher failed, rolling back: {}", e);
            if had_exe && let Err(rollback) = fs::rename(&self.old_path, &self.exe_path) {
                warn!(
                    "Rollback failed; previous launcher remains at {}: {}",
                    self.old_path.display(),
                    rollback
                );
            }
            return Err(LauncherError::from_io("installing new launcher", &self.exe_path, e));
        }

        info!("Replaced launcher executable {}", self.exe_path.display());
        Ok(())
    }
}

fn is_zip(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file =
        File::open(path).map_err(|e| LauncherError::from_io("opening launcher download", path, e))?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(LauncherError::from_io("reading launcher download", path, e)),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| LauncherError::Io {
        operation: "joining self-update task".to_string(),
        path: String::new(),
        source: io::Error::other(e),
    })?
}

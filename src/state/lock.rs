//! Per-target job lock shared across launcher processes.

use crate::core::{LauncherError, Result, TargetKind};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive lock on `<state_dir>/.locks/<target>.lock`.
///
/// Held for the mutating part of an update job. Released on drop.
#[derive(Debug)]
pub struct JobLock {
    file: File,
    path: PathBuf,
}

impl JobLock {
    /// Wait for and take the lock for `kind`.
    pub async fn acquire(state_dir: &Path, kind: TargetKind) -> Result<Self> {
        let locks_dir = state_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir)
            .await
            .map_err(|e| LauncherError::from_io("creating locks directory", &locks_dir, e))?;

        let path = locks_dir.join(format!("{kind}.lock"));
        let lock_path = path.clone();

        // Locking blocks until another process releases it
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&lock_path)
                .map_err(|e| LauncherError::from_io("opening lock file", &lock_path, e))?;
            file.lock_exclusive()
                .map_err(|e| LauncherError::from_io("acquiring job lock", &lock_path, e))?;
            Ok(file)
        })
        .await
        .map_err(|e| LauncherError::Io {
            operation: "joining lock task".to_string(),
            path: path.display().to_string(),
            source: std::io::Error::other(e),
        })??;

        debug!("Acquired {} job lock", kind);
        Ok(Self {
            file,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

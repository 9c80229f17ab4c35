//! Persisted install state.
//!
//! One JSON file per target kind under the state directory
//! (`client-state.json`, `launcher-state.json`). Files are replaced atomically, so a
//! crash mid-write leaves the previous state readable.
//!
//! The client's install root also carries a plain `version.txt` marker. It is
//! written after every successful install and used as a fallback when no state file
//! records a version, which is the case for installs made by older launchers.

mod lock;

pub use lock::JobLock;

use crate::core::{LauncherError, Result, TargetKind};
use crate::utils::fs::atomic_write;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the version marker inside the install root.
pub const VERSION_MARKER: &str = "version.txt";

/// What is installed for one target kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    pub install_root: PathBuf,
    /// Installed version, `None` when nothing has been installed.
    #[serde(default)]
    pub version: Option<String>,
    /// Last completed check, successful or not.
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl InstallState {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            version: None,
            last_check: None,
            last_update: None,
        }
    }

    pub fn installed_version(&self) -> Option<Version> {
        self.version.as_deref().map(Version::parse)
    }

    pub fn record_check(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// Mark `version` as installed now.
    pub fn record_install(&mut self, version: impl Into<String>) {
        let now = Utc::now();
        self.version = Some(version.into());
        self.last_update = Some(now);
        self.last_check = Some(now);
    }
}

/// Reads and writes [`InstallState`] files.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: state_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: TargetKind) -> PathBuf {
        self.dir.join(format!("{kind}-state.json"))
    }

    /// Load the state for `kind`, falling back to a fresh state rooted at `install_root`.
    ///
    /// An unreadable or malformed file is logged and treated as absent; the next
    /// successful install rewrites it. The configured `install_root` always wins over
    /// the recorded one.
    pub async fn load(&self, kind: TargetKind, install_root: &Path) -> Result<InstallState> {
        let path = self.path(kind);
        let mut state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<InstallState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Ignoring malformed state file {}: {}", path.display(), e);
                    InstallState::new(install_root)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => InstallState::new(install_root),
            Err(e) => return Err(LauncherError::from_io("reading state file", &path, e)),
        };

        if state.install_root != install_root {
            debug!(
                "Install root changed from {} to {}; recorded version dropped",
                state.install_root.display(),
                install_root.display()
            );
            state = InstallState {
                version: None,
                ..InstallState::new(install_root)
            };
        }

        if state.version.is_none() && kind == TargetKind::Client {
            state.version = read_version_marker(install_root).await;
        }

        Ok(state)
    }

    pub async fn save(&self, kind: TargetKind, state: &InstallState) -> Result<()> {
        let path = self.path(kind);
        let content = serde_json::to_vec_pretty(state).map_err(|e| LauncherError::Io {
            operation: "serializing install state".to_string(),
            path: path.display().to_string(),
            source: e.into(),
        })?;

        tokio::task::spawn_blocking(move || atomic_write(&path, &content)).await.map_err(|e| {
            LauncherError::Io {
                operation: "joining state write".to_string(),
                path: String::new(),
                source: std::io::Error::other(e),
            }
        })??;

        debug!("Saved {} state", kind);
        Ok(())
    }

    /// Exclusive job lock for `kind`, shared with other launcher processes.
    pub async fn lock(&self, kind: TargetKind) -> Result<JobLock> {
        JobLock::acquire(&self.dir, kind).await
    }
}

/// Version recorded in `<root>/version.txt`, if present.
pub async fn read_version_marker(root: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(root.join(VERSION_MARKER)).await.ok()?;
    let version = content.trim();
    (!version.is_empty()).then(|| version.to_string())
}

pub async fn write_version_marker(root: &Path, version: &str) -> Result<()> {
    let path = root.join(VERSION_MARKER);
    let content = format!("{version}\n");
    tokio::task::spawn_blocking(move || atomic_write(&path, content.as_bytes())).await.map_err(
        |e| LauncherError::Io {
            operation: "joining version marker write".to_string(),
            path: String::new(),
            source: std::io::Error::other(e),
        },
    )?
}

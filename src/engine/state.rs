//! Job states, shell commands, and the execution capability flag.

use crate::core::{LauncherError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// State of the update job for one target kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Idle,
    Checking,
    UpdateAvailable,
    UpToDate,
    CheckFailed,
    AwaitingConsent,
    Downloading,
    Installing,
    RestoringProtected,
    Failed,
}

impl JobState {
    /// Whether a job occupies the target. Triggers are coalesced while true.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Checking
                | Self::UpdateAvailable
                | Self::AwaitingConsent
                | Self::Downloading
                | Self::Installing
                | Self::RestoringProtected
        )
    }

    /// Whether a user cancel is honoured in this state.
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::AwaitingConsent | Self::Downloading)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::UpdateAvailable => "update available",
            Self::UpToDate => "up to date",
            Self::CheckFailed => "check failed",
            Self::AwaitingConsent => "awaiting consent",
            Self::Downloading => "downloading",
            Self::Installing => "installing",
            Self::RestoringProtected => "restoring protected data",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of asking for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A job for this target is already running; the trigger was dropped.
    Coalesced,
    /// The engine has shut down.
    Closed,
}

/// Result of asking to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Requested,
    /// The job is installing; a half-applied install is worse than a slow one.
    Refused,
    NoActiveJob,
}

/// Shell-to-engine messages for one target worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Check,
    Consent(bool),
    Cancel,
}

/// Whether this process can replace its own executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A standalone built executable at `exe_path`.
    Packaged {
        exe_path: PathBuf,
    },
    /// Running from a development build; there is no executable to swap.
    Source,
}

/// Environment variable forcing the execution mode (`packaged` or `source`).
pub const EXECUTION_MODE_ENV: &str = "LAUNCHKIT_EXECUTION_MODE";

impl ExecutionMode {
    /// Detect the mode of the current process.
    ///
    /// Binaries started by `cargo run` or living in a cargo `target/` directory
    /// count as source builds.
    pub fn detect() -> Self {
        let Ok(exe_path) = std::env::current_exe() else {
            return Self::Source;
        };

        match std::env::var(EXECUTION_MODE_ENV).ok().as_deref() {
            Some("source") => return Self::Source,
            Some("packaged") => {
                return Self::Packaged {
                    exe_path,
                };
            }
            _ => {}
        }

        if std::env::var_os("CARGO").is_some() || is_cargo_target_dir(&exe_path) {
            Self::Source
        } else {
            Self::Packaged {
                exe_path,
            }
        }
    }

    pub fn is_packaged(&self) -> bool {
        matches!(self, Self::Packaged { .. })
    }

    /// Executable path, or `CapabilityUnavailable` for source builds.
    pub fn require_packaged(&self) -> Result<&Path> {
        match self {
            Self::Packaged {
                exe_path,
            } => Ok(exe_path),
            Self::Source => Err(LauncherError::CapabilityUnavailable {
                reason: "the launcher is running from a development build".to_string(),
            }),
        }
    }
}

fn is_cargo_target_dir(exe: &Path) -> bool {
    let mut components = exe.components().rev().skip(1);
    let profile = components.next().map(|c| c.as_os_str().to_string_lossy().into_owned());
    let parent = components.next().map(|c| c.as_os_str().to_string_lossy().into_owned());
    matches!(
        (profile.as_deref(), parent.as_deref()),
        (Some("debug" | "release"), Some("target")) | (Some("deps"), Some("debug" | "release"))
    )
}

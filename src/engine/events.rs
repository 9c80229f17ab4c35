//! Engine-to-shell events.

use super::JobState;
use crate::core::{ErrorKind, LauncherError, TargetKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    UpToDate {
        version: Option<String>,
    },
    UpdateAvailable {
        /// `None` when nothing is installed yet.
        current: Option<String>,
        available: String,
    },
    Failed(Failure),
}

/// How a job that left the check phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Installed {
        version: String,
    },
    /// The shell declined the update while it awaited consent.
    Declined,
    Cancelled,
    Failed(Failure),
}

/// A surfaced error: machine-readable kind plus the human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: Option<String>,
    pub retry_after: Option<Duration>,
    /// Where protected data still lives when it could not be restored.
    pub quarantine: Option<PathBuf>,
}

impl From<&LauncherError> for Failure {
    fn from(error: &LauncherError) -> Self {
        let retry_after = match error {
            LauncherError::RateLimited {
                retry_after,
            } => *retry_after,
            _ => None,
        };
        let quarantine = match error {
            LauncherError::ProtectionRestoreError {
                quarantine,
                ..
            } => Some(PathBuf::from(quarantine)),
            _ => None,
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            suggestion: error.suggestion().map(String::from),
            retry_after,
            quarantine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged {
        target: TargetKind,
        state: JobState,
    },
    CheckStarted {
        target: TargetKind,
    },
    CheckCompleted {
        target: TargetKind,
        result: CheckResult,
    },
    /// The engine waits for [`EngineHandle::consent`](super::EngineHandle::consent).
    ConsentRequested {
        target: TargetKind,
        current: Option<String>,
        available: String,
        description: String,
    },
    Progress {
        target: TargetKind,
        bytes: u64,
        total: Option<u64>,
        percent: Option<u8>,
    },
    JobCompleted {
        target: TargetKind,
        outcome: JobOutcome,
    },
    /// The launcher binary was replaced; the new version runs after a restart.
    SelfUpdateRequiresRestart {
        version: String,
        exe_path: PathBuf,
    },
}

impl EngineEvent {
    pub fn target(&self) -> Option<TargetKind> {
        match self {
            Self::StateChanged {
                target,
                ..
            }
            | Self::CheckStarted {
                target,
            }
            | Self::CheckCompleted {
                target,
                ..
            }
            | Self::ConsentRequested {
                target,
                ..
            }
            | Self::Progress {
                target,
                ..
            }
            | Self::JobCompleted {
                target,
                ..
            } => Some(*target),
            Self::SelfUpdateRequiresRestart {
                ..
            } => Some(TargetKind::Launcher),
        }
    }
}

/// Receiver of engine events. Called from worker tasks; must not block.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: EngineEvent);
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
            },
            rx,
        )
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // A closed receiver means the shell went away; events are dropped.
        let _ = self.tx.send(event);
    }
}

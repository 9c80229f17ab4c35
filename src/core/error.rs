//! Error handling for launchkit
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** so the engine can decide what is recoverable
//! 2. **User-friendly messages** with actionable suggestions for whoever shows them
//!
//! # Architecture
//!
//! - [`LauncherError`] - every failure the update engine can surface
//! - [`ErrorKind`] - the machine-distinguishable discriminant shipped in engine events
//! - [`ErrorContext`] - wrapper that adds details and a suggestion for display
//!
//! # Recoverability
//!
//! Errors raised while checking for updates ([`ErrorKind::Network`],
//! [`ErrorKind::NotFound`], [`ErrorKind::RateLimited`]) are absorbed by the scheduler
//! and retried on the next timer tick. Everything raised from the download step
//! onwards ends the job and is reported verbatim.
//!
//! # Examples
//!
//! ```rust,no_run
//! use launchkit::core::{ErrorKind, LauncherError, user_friendly_error};
//!
//! let err = LauncherError::NotFound {
//!     what: "asset 'client.zip' in release v1.2.0".to_string(),
//! };
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//!
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Every failure the update engine can report.
#[derive(Error, Debug)]
pub enum LauncherError {
    /// Connectivity failure, timeout, or an unexpected HTTP status.
    #[error("Network error while {operation}: {reason}")]
    NetworkError {
        /// What the engine was doing (e.g. "fetching releases").
        operation: String,
        /// Underlying transport or status message.
        reason: String,
    },

    /// No matching release or asset exists on the remote source.
    #[error("Not found: {what}")]
    NotFound {
        /// Human description of what was missing.
        what: String,
    },

    /// The remote API throttled the caller.
    #[error("Release source rate limit exceeded{}", retry_suffix(.retry_after))]
    RateLimited {
        /// How long the remote asked us to wait, if it said.
        retry_after: Option<Duration>,
    },

    /// Downloaded bytes do not match the published checksum.
    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    IntegrityError {
        name: String,
        expected: String,
        actual: String,
    },

    /// The archive cannot be opened, enumerated, or is unsafe to extract.
    #[error("Archive {path} is corrupt: {reason}")]
    CorruptArchive {
        path: String,
        reason: String,
    },

    /// The filesystem ran out of space.
    #[error("Disk full while {operation}: {path}")]
    DiskFull {
        operation: String,
        path: String,
    },

    /// The filesystem refused access.
    #[error("Permission denied while {operation}: {path}")]
    PermissionDenied {
        operation: String,
        path: String,
    },

    /// Protected data could not be copied back; it is still in quarantine.
    #[error(
        "Failed to restore protected data ({reason}). Your data is preserved at {quarantine}"
    )]
    ProtectionRestoreError {
        /// Directory that still holds the user's data.
        quarantine: String,
        reason: String,
    },

    /// Self-update was requested in an execution that has no replaceable executable.
    #[error("Self-update unavailable: {reason}")]
    CapabilityUnavailable {
        reason: String,
    },

    /// A transfer was cancelled by the user.
    #[error("Download cancelled")]
    Cancelled,

    /// A protected path would cover the install root or escape it.
    #[error("Invalid protected path '{path}': {reason}")]
    InvalidProtectedPath {
        path: String,
        reason: String,
    },

    /// Configuration rejected at load time.
    #[error("Configuration error: {message}")]
    InvalidConfig {
        message: String,
    },

    /// Any other I/O failure.
    #[error("I/O error while {operation} ({path}): {source}")]
    Io {
        operation: String,
        path: String,
        #[source]
        source: io::Error,
    },
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry in {}s)", d.as_secs()),
        None => String::new(),
    }
}

/// Machine-distinguishable kind of a [`LauncherError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    NotFound,
    RateLimited,
    Integrity,
    CorruptArchive,
    DiskFull,
    PermissionDenied,
    ProtectionRestore,
    CapabilityUnavailable,
    Cancelled,
    InvalidConfig,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::NotFound => "not-found",
            Self::RateLimited => "rate-limited",
            Self::Integrity => "integrity",
            Self::CorruptArchive => "corrupt-archive",
            Self::DiskFull => "disk-full",
            Self::PermissionDenied => "permission-denied",
            Self::ProtectionRestore => "protection-restore",
            Self::CapabilityUnavailable => "capability-unavailable",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid-config",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkError {
                ..
            } => ErrorKind::Network,
            Self::NotFound {
                ..
            } => ErrorKind::NotFound,
            Self::RateLimited {
                ..
            } => ErrorKind::RateLimited,
            Self::IntegrityError {
                ..
            } => ErrorKind::Integrity,
            Self::CorruptArchive {
                ..
            } => ErrorKind::CorruptArchive,
            Self::DiskFull {
                ..
            } => ErrorKind::DiskFull,
            Self::PermissionDenied {
                ..
            } => ErrorKind::PermissionDenied,
            Self::ProtectionRestoreError {
                ..
            } => ErrorKind::ProtectionRestore,
            Self::CapabilityUnavailable {
                ..
            } => ErrorKind::CapabilityUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidProtectedPath {
                ..
            }
            | Self::InvalidConfig {
                ..
            } => ErrorKind::InvalidConfig,
            Self::Io {
                ..
            } => ErrorKind::Io,
        }
    }

    /// Whether a failed check with this error should simply wait for the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::RateLimited | ErrorKind::NotFound)
    }

    pub fn network(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::NetworkError {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Classify an I/O error so disk-full and permission failures keep their kind.
    pub fn from_io(operation: impl Into<String>, path: &Path, source: io::Error) -> Self {
        let operation = operation.into();
        let path = path.display().to_string();

        if is_disk_full(&source) {
            return Self::DiskFull {
                operation,
                path,
            };
        }

        if source.kind() == io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                operation,
                path,
            };
        }

        Self::Io {
            operation,
            path,
            source,
        }
    }

    /// Suggestion shown under the error in the console shell.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Network => Some("Check your internet connection and try again"),
            ErrorKind::NotFound => {
                Some("Verify the repository and asset name in the launcher configuration")
            }
            ErrorKind::RateLimited => {
                Some("Wait for the rate limit to reset or configure an API token")
            }
            ErrorKind::Integrity => {
                Some("The download was corrupted or tampered with; retry the update")
            }
            ErrorKind::CorruptArchive => Some("Retry the update; the release archive may be broken"),
            ErrorKind::DiskFull => Some("Free up disk space and retry the update"),
            ErrorKind::PermissionDenied => {
                Some("Close the game client and check that the install folder is writable")
            }
            ErrorKind::ProtectionRestore => {
                Some("Copy the preserved folders back into the install folder manually")
            }
            ErrorKind::CapabilityUnavailable => {
                Some("Self-update only works for the packaged launcher executable")
            }
            ErrorKind::InvalidConfig => Some("Fix the launcher configuration file"),
            ErrorKind::Cancelled | ErrorKind::Io => None,
        }
    }
}

fn is_disk_full(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::StorageFull {
        return true;
    }
    // ENOSPC on Unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on Windows
    #[cfg(unix)]
    let codes: &[i32] = &[28];
    #[cfg(windows)]
    let codes: &[i32] = &[112, 39];
    #[cfg(not(any(unix, windows)))]
    let codes: &[i32] = &[];
    err.raw_os_error().is_some_and(|code| codes.contains(&code))
}

/// Result alias used by the engine layers.
pub type Result<T> = std::result::Result<T, LauncherError>;

/// Error with optional details and suggestion for display.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: anyhow::Error,
    pub kind: Option<ErrorKind>,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(error: anyhow::Error) -> Self {
        Self {
            error,
            kind: None,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with a suggestion where one applies.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let (kind, suggestion, details) = match error.downcast_ref::<LauncherError>() {
        Some(launcher_error) => {
            let details = match launcher_error {
                LauncherError::ProtectionRestoreError {
                    quarantine,
                    ..
                } => Some(format!("Quarantined data: {quarantine}")),
                _ => None,
            };
            (Some(launcher_error.kind()), launcher_error.suggestion().map(String::from), details)
        }
        None => match error.downcast_ref::<io::Error>() {
            Some(io_error) if io_error.kind() == io::ErrorKind::PermissionDenied => (
                Some(ErrorKind::PermissionDenied),
                Some("Check file permissions for the launcher directories".to_string()),
                None,
            ),
            _ => (None, None, None),
        },
    };

    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    let details = details.or_else(|| (!chain.is_empty()).then(|| chain.join(": ")));

    ErrorContext {
        error,
        kind,
        suggestion,
        details,
    }
}

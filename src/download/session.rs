//! Handles for in-flight transfers.

use crate::core::{LauncherError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cooperative cancellation flag shared between a session and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One in-flight download.
///
/// Dropping the session without calling [`wait`](Self::wait) or
/// [`cancel`](Self::cancel) lets the transfer run to completion in the background.
#[derive(Debug)]
pub struct TransferSession {
    pub(super) url: String,
    pub(super) destination: PathBuf,
    pub(super) total: Option<u64>,
    pub(super) transferred: Arc<AtomicU64>,
    pub(super) token: CancelToken,
    pub(super) task: JoinHandle<Result<PathBuf>>,
}

impl TransferSession {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Size announced before the transfer started, if any.
    pub fn expected_size(&self) -> Option<u64> {
        self.total
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Token that cancels this session from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the transfer and return the promoted destination path.
    pub async fn wait(self) -> Result<PathBuf> {
        self.task.await.map_err(|e| LauncherError::network("downloading", e))?
    }

    /// Cancel the transfer.
    ///
    /// Returns only after the download task has exited, so its temporary file is
    /// already gone and nothing was promoted to the destination.
    pub async fn cancel(self) {
        debug!("Cancelling download of {}", self.url);
        self.token.cancel();
        match self.task.await {
            Ok(Err(LauncherError::Cancelled)) => {}
            Ok(Ok(path)) => {
                // Finished before the flag was observed; withdraw the promoted file.
                if let Err(e) = crate::utils::fs::remove_path(&path) {
                    warn!("Failed to remove completed download {}: {}", path.display(), e);
                }
            }
            Ok(Err(e)) => debug!("Download ended with {} while cancelling", e),
            Err(e) => warn!("Download task failed while cancelling: {}", e),
        }
    }
}

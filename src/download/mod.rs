//! Streaming downloads with progress, integrity checks, and cancellation.
//!
//! A download never writes to its final path directly. The body is streamed into a
//! temporary file created next to the destination (same volume), hashed as it
//! arrives, and only renamed onto the destination once the transfer completed and
//! the checksum matched. Every other exit (network failure, checksum mismatch,
//! cancellation) drops the temporary file, which deletes it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use launchkit::download::{DownloadManager, DownloadRequest, progress};
//!
//! # async fn example(client: reqwest::Client) -> launchkit::core::Result<()> {
//! let manager = DownloadManager::new(client);
//! let request = DownloadRequest::new("https://example.org/client.zip", "/tmp/dl/client.zip");
//! let session = manager.start(request, progress::silent());
//! let path = session.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod progress;
mod session;

pub use progress::{Progress, ProgressFn};
pub use session::{CancelToken, TransferSession};

use crate::core::{LauncherError, Result};
use crate::release::http::{OCTET_STREAM, check_status};
use futures::StreamExt;
use progress::Throttle;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Lowercase hex SHA-256 the body must hash to.
    pub expected_sha256: Option<String>,
    /// Size hint used for progress when the server sends no `Content-Length`.
    pub expected_size: Option<u64>,
    /// Sent as `Authorization: Bearer`, asking for the raw asset bytes.
    pub bearer_token: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected_sha256: None,
            expected_size: None,
            bearer_token: None,
        }
    }

    pub fn with_checksum(mut self, sha256: Option<String>) -> Self {
        self.expected_sha256 = sha256.map(|s| s.to_ascii_lowercase());
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

/// Starts transfers on the shared HTTP client.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
}

impl DownloadManager {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
        }
    }

    /// Spawn a transfer and return its session handle immediately.
    pub fn start(&self, request: DownloadRequest, on_progress: ProgressFn) -> TransferSession {
        let token = CancelToken::new();
        let transferred = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run_transfer(
            self.client.clone(),
            request.clone(),
            token.clone(),
            transferred.clone(),
            on_progress,
        ));

        TransferSession {
            url: request.url,
            destination: request.destination,
            total: request.expected_size,
            transferred,
            token,
            task,
        }
    }
}

async fn run_transfer(
    client: reqwest::Client,
    request: DownloadRequest,
    token: CancelToken,
    transferred: Arc<AtomicU64>,
    on_progress: ProgressFn,
) -> Result<PathBuf> {
    let destination = &request.destination;
    let dir = destination.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| LauncherError::from_io("creating download directory", dir, e))?;

    let temp = tempfile::Builder::new()
        .prefix(".launchkit-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| LauncherError::from_io("creating temporary download file", dir, e))?;
    // `temp_path` deletes the file when dropped, on every early return below.
    let (std_file, temp_path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(std_file);

    debug!("Downloading {} via {}", request.url, temp_path.display());

    let mut get = client.get(&request.url);
    if let Some(bearer) = &request.bearer_token {
        get = get.bearer_auth(bearer).header("Accept", OCTET_STREAM);
    }

    let response = tokio::select! {
        biased;
        () = token.cancelled() => return Err(LauncherError::Cancelled),
        response = get.send() => {
            response.map_err(|e| LauncherError::network(format!("downloading {}", request.url), e))?
        }
    };
    let response = check_status(response, &request.url)?;

    let content_length = response.content_length();
    let total = content_length.or(request.expected_size);
    let mut throttle = Throttle::new(on_progress, total);
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;

    throttle.update(0);
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("Download of {} cancelled after {} bytes", request.url, bytes);
                return Err(LauncherError::Cancelled);
            }
            next = stream.next() => next,
        };

        let chunk = match next {
            None => break,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                return Err(LauncherError::network(format!("downloading {}", request.url), e));
            }
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| LauncherError::from_io("writing download", &temp_path, e))?;
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        transferred.store(bytes, Ordering::Relaxed);
        throttle.update(bytes);
    }

    file.flush().await.map_err(|e| LauncherError::from_io("writing download", &temp_path, e))?;
    file.sync_all().await.map_err(|e| LauncherError::from_io("syncing download", &temp_path, e))?;
    drop(file);

    if token.is_cancelled() {
        return Err(LauncherError::Cancelled);
    }

    if let Some(expected) = content_length
        && expected != bytes
    {
        return Err(LauncherError::network(
            format!("downloading {}", request.url),
            format!("connection closed after {bytes} of {expected} bytes"),
        ));
    }

    throttle.finish(bytes);

    let actual = hex::encode(hasher.finalize());
    match &request.expected_sha256 {
        Some(expected) if !expected.eq_ignore_ascii_case(&actual) => {
            warn!("Checksum mismatch for {}", request.url);
            return Err(LauncherError::IntegrityError {
                name: file_label(destination),
                expected: expected.clone(),
                actual,
            });
        }
        Some(_) => debug!("Checksum verified for {}", request.url),
        None => debug!("No checksum to verify for {} (sha256 {})", request.url, actual),
    }

    temp_path
        .persist(destination)
        .map_err(|e| LauncherError::from_io("promoting download", destination, e.error))?;

    info!("Downloaded {} ({} bytes) to {}", request.url, bytes, destination.display());
    Ok(destination.clone())
}

fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

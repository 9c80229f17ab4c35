//! Test utilities for launchkit
//!
//! Helpers shared by unit tests and the integration test target (through the
//! `test-utils` feature): logging setup, release archive fixtures, and a raw HTTP
//! server for transfers that need to stall or break mid-body.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Once;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing for tests.
///
/// Logs nothing unless a level is passed or `RUST_LOG` is set.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Build a zip archive in memory. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, zip_bytes(entries)).unwrap();
}

/// HTTP server that announces a body, sends only its first part, and then either
/// stalls forever or closes the connection.
pub struct StallingServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl StallingServer {
    /// Send `first_chunk` of a `declared_len` body, then hold the connection open.
    pub async fn start(first_chunk: Vec<u8>, declared_len: u64) -> Self {
        Self::spawn(first_chunk, declared_len, false).await
    }

    /// Send `first_chunk` of a `declared_len` body, then close the connection.
    pub async fn start_truncated(first_chunk: Vec<u8>, declared_len: u64) -> Self {
        Self::spawn(first_chunk, declared_len, true).await
    }

    async fn spawn(first_chunk: Vec<u8>, declared_len: u64, close: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let chunk = first_chunk.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {declared_len}\r\n\r\n"
                    );
                    if socket.write_all(head.as_bytes()).await.is_err()
                        || socket.write_all(&chunk).await.is_err()
                    {
                        return;
                    }
                    let _ = socket.flush().await;

                    if close {
                        let _ = socket.shutdown().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                });
            }
        });

        Self {
            addr,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for StallingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

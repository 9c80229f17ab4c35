//! Common fixtures for launchkit integration tests
//!
//! A [`LauncherFixture`] owns a temp directory holding the install root, the state
//! directory, and a config file, and builds release API payloads for a mock server.

// Not every test file uses every helper
#![allow(dead_code)]

use launchkit::config::{LauncherConfig, SourceConfig};
use launchkit::core::TargetKind;
use launchkit::engine::{ChannelSink, Engine, EngineEvent, EngineHandle, ExecutionMode, JobOutcome};
use launchkit::test_utils::{init_test_logging, sha256_hex};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

pub const OWNER: &str = "example-org";
pub const REPO: &str = "client-releases";
pub const RELEASES_PATH: &str = "/repos/example-org/client-releases/releases";

/// Temp directory layout for one launcher install.
pub struct LauncherFixture {
    pub temp: TempDir,
    pub config: LauncherConfig,
}

impl LauncherFixture {
    /// Fixture whose client source is a GitHub repository served by `api_base`.
    pub fn github(api_base: &str) -> Self {
        init_test_logging(None);
        let temp = TempDir::new().unwrap();
        let config = LauncherConfig {
            server_name: "Test Realm".to_string(),
            install_root: Some(temp.path().join("client")),
            state_dir: Some(temp.path().join("state")),
            client: SourceConfig::github(OWNER, REPO, "client.zip"),
            api_base_url: api_base.to_string(),
            auto_update: false,
            unattended_install: true,
            connect_timeout_secs: 2,
            read_timeout_secs: 2,
            ..LauncherConfig::default()
        };
        Self {
            temp,
            config,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.config.install_root()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.state_dir()
    }

    /// Write a file under the install root.
    pub fn write(&self, relative: &str, content: &[u8]) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.root().join(relative)).unwrap()
    }

    /// Persist the config as TOML and return its path.
    pub fn write_config(&self) -> PathBuf {
        let path = self.temp.path().join("config.toml");
        fs::write(&path, toml::to_string(&self.config).unwrap()).unwrap();
        path
    }

    /// Start an engine in source mode and return it with its event stream.
    pub async fn spawn(&self) -> (EngineHandle, UnboundedReceiver<EngineEvent>) {
        let (sink, rx) = ChannelSink::new();
        let handle =
            Engine::spawn(self.config.clone(), ExecutionMode::Source, Arc::new(sink)).await.unwrap();
        (handle, rx)
    }

    /// `launchkit` binary pointed at this fixture's config.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("launchkit").unwrap();
        cmd.arg("--config")
            .arg(self.write_config())
            .arg("--no-progress")
            .env("LAUNCHKIT_EXECUTION_MODE", "source")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .timeout(Duration::from_secs(30));
        cmd
    }
}

/// Release listing with one `client.zip` asset carrying a sha256 digest.
pub fn release_listing(tag: &str, asset_url: &str, archive: &[u8]) -> String {
    json!([release_entry(tag, asset_url, archive, false)]).to_string()
}

pub fn release_entry(tag: &str, asset_url: &str, archive: &[u8], prerelease: bool) -> serde_json::Value {
    json!({
        "tag_name": tag,
        "name": format!("Client {tag}"),
        "body": format!("Release notes for {tag}"),
        "draft": false,
        "prerelease": prerelease,
        "assets": [{
            "name": "client.zip",
            "browser_download_url": asset_url,
            "size": archive.len(),
            "digest": format!("sha256:{}", sha256_hex(archive)),
        }]
    })
}

/// Wait for the next `JobCompleted` of `kind`, failing after ten seconds.
pub async fn job_outcome(rx: &mut UnboundedReceiver<EngineEvent>, kind: TargetKind) -> JobOutcome {
    let event = next_event(rx, |event| {
        matches!(event, EngineEvent::JobCompleted { target, .. } if *target == kind)
    })
    .await;
    match event {
        EngineEvent::JobCompleted {
            outcome,
            ..
        } => outcome,
        other => panic!("unexpected event {other:?}"),
    }
}

/// Wait for the first event matching `pred`, failing after ten seconds.
pub async fn next_event(
    rx: &mut UnboundedReceiver<EngineEvent>,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("engine stopped");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

/// Every file below `dir`, relative and sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    files.sort();
    files
}
